//! Vault records and their encrypted envelope.
//!
//! The structured record (`VaultItemPayload`) only ever exists in decrypted
//! form in memory. At rest a record is a `VaultItemRow`: id, item type,
//! timestamps, the decoy flag, and one symmetric blob holding the JSON
//! payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encryption::{decrypt_string, encrypt_string};
use crate::crypto::keys::KeyHandle;
use crate::errors::{Result, VaultCoreError};

/// A user-defined field attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub label: String,
    pub value: String,
    /// Render masked in the UI.
    #[serde(default)]
    pub hidden: bool,
}

/// Decrypted contents of a vault record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultItemPayload {
    pub title: String,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    pub category_id: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

impl VaultItemPayload {
    /// Overwrite every string-valued field with empty content.
    ///
    /// For callers that hold decrypted material longer than one operation.
    pub fn secure_clear(&mut self) {
        self.title.zeroize();
        for field in [
            &mut self.username,
            &mut self.secret,
            &mut self.notes,
            &mut self.url,
            &mut self.category_id,
        ]
        .into_iter()
        .flatten()
        {
            field.zeroize();
        }
        for custom in &mut self.custom_fields {
            custom.label.zeroize();
            custom.value.zeroize();
        }
    }
}

/// Kind of record, kept in the clear for filtering and icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Password,
    Note,
    Card,
    Identity,
}

/// A record as stored locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultItemRow {
    pub id: String,
    pub vault_id: String,
    /// Symmetric blob (base64) holding the JSON payload.
    pub encrypted_data: String,
    pub item_type: ItemType,
    /// Shown only under duress unlock.
    #[serde(default)]
    pub is_decoy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category (folder) row. The name is encrypted like item payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub id: String,
    pub vault_id: String,
    pub encrypted_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Serialize and encrypt a record into blob text.
pub fn encrypt_vault_item(payload: &VaultItemPayload, key: &KeyHandle) -> Result<String> {
    let json = Zeroizing::new(
        serde_json::to_string(payload)
            .map_err(|e| VaultCoreError::Serialization(format!("vault item: {e}")))?,
    );
    encrypt_string(key, &json)
}

/// Decrypt and deserialize a record produced by `encrypt_vault_item`.
pub fn decrypt_vault_item(blob: &str, key: &KeyHandle) -> Result<VaultItemPayload> {
    let json = Zeroizing::new(decrypt_string(key, blob)?);
    serde_json::from_str(&json)
        .map_err(|e| VaultCoreError::Serialization(format!("vault item payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::RawKey;

    fn sample() -> VaultItemPayload {
        VaultItemPayload {
            title: "Bank".into(),
            username: Some("alice".into()),
            secret: Some("s3cr3t".into()),
            notes: None,
            url: Some(String::new()),
            favorite: true,
            category_id: Some("cat-1".into()),
            custom_fields: vec![CustomField {
                label: "PIN".into(),
                value: "0000".into(),
                hidden: true,
            }],
        }
    }

    #[test]
    fn roundtrip_preserves_nulls_and_empty_strings() {
        let key = KeyHandle::from_raw(&RawKey::generate()).unwrap();
        let blob = encrypt_vault_item(&sample(), &key).unwrap();
        let back = decrypt_vault_item(&blob, &key).unwrap();

        assert_eq!(back, sample());
        assert_eq!(back.notes, None);
        assert_eq!(back.url.as_deref(), Some(""));
    }

    #[test]
    fn secure_clear_empties_every_string() {
        let mut item = sample();
        item.secure_clear();

        assert!(item.title.is_empty());
        assert_eq!(item.username.as_deref(), Some(""));
        assert_eq!(item.secret.as_deref(), Some(""));
        assert_eq!(item.notes, None);
        assert_eq!(item.category_id.as_deref(), Some(""));
        assert!(item.custom_fields[0].value.is_empty());
        assert!(item.custom_fields[0].label.is_empty());
    }

    #[test]
    fn row_serializes_item_type_in_snake_case() {
        let json = serde_json::to_string(&ItemType::Identity).unwrap();
        assert_eq!(json, "\"identity\"");
    }
}
