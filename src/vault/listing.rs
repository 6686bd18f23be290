//! Decrypt-and-filter for item lists.
//!
//! One bad row (stale key, corrupted blob) never takes the whole list down:
//! it is skipped and reported once per `(id, updated_at)` so a list that is
//! re-rendered many times does not flood the log.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::item::{decrypt_vault_item, VaultItemPayload, VaultItemRow};
use crate::crypto::keys::KeyHandle;
use crate::unlock::UnlockMode;

/// A row together with its decrypted payload.
#[derive(Debug, Clone)]
pub struct DecryptedItem {
    pub row: VaultItemRow,
    pub payload: VaultItemPayload,
}

/// Stateful decryptor that remembers which failures it already reported.
#[derive(Debug, Default)]
pub struct ItemDecryptor {
    reported: Mutex<HashSet<(String, DateTime<Utc>)>>,
}

impl ItemDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decrypt the rows visible under `mode`.
    ///
    /// Real unlocks see non-decoy rows; duress unlocks see decoy rows only;
    /// an invalid unlock sees nothing.
    pub fn visible_items(
        &self,
        rows: &[VaultItemRow],
        key: &KeyHandle,
        mode: UnlockMode,
    ) -> Vec<DecryptedItem> {
        let want_decoys = match mode {
            UnlockMode::Real => false,
            UnlockMode::Duress => true,
            UnlockMode::Invalid => return Vec::new(),
        };

        rows.iter()
            .filter(|row| row.is_decoy == want_decoys)
            .filter_map(|row| match decrypt_vault_item(&row.encrypted_data, key) {
                Ok(payload) => Some(DecryptedItem {
                    row: row.clone(),
                    payload,
                }),
                Err(e) => {
                    self.report_once(row, &e.to_string());
                    None
                }
            })
            .collect()
    }

    fn report_once(&self, row: &VaultItemRow, reason: &str) {
        let mut reported = match self.reported.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if reported.insert((row.id.clone(), row.updated_at)) {
            warn!(item_id = %row.id, updated_at = %row.updated_at, %reason, "skipping undecryptable vault item");
        }
    }

    /// Number of distinct `(id, updated_at)` failures seen so far.
    pub fn reported_failures(&self) -> usize {
        match self.reported.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
