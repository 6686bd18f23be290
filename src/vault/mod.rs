//! Vault module — encrypted records.
//!
//! This module provides:
//! - Record payloads, stored rows and the item cipher (`item`)
//! - Mode-aware decrypt-and-filter for item lists (`listing`)

pub mod item;
pub mod listing;

// Re-export the most commonly used items.
pub use item::{
    decrypt_vault_item, encrypt_vault_item, CategoryRow, CustomField, ItemType, VaultItemPayload,
    VaultItemRow,
};
pub use listing::{DecryptedItem, ItemDecryptor};
