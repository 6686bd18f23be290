//! Trust-on-first-use integrity roots.

mod common;

use std::sync::Arc;

use zkvault::integrity::IntegrityVerifier;
use zkvault::storage::MemoryStore;

use common::{item_row, light_manager};

fn verifier() -> IntegrityVerifier {
    IntegrityVerifier::new(Arc::new(MemoryStore::new()), light_manager())
}

#[tokio::test]
async fn first_check_establishes_baseline() {
    let verifier = verifier();
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    let items = vec![item_row("a", "v1", "blob-a"), item_row("b", "v1", "blob-b")];

    assert!(!verifier.has_integrity_root("u1").await.unwrap());

    let first = verifier.verify_vault_integrity(&items, &key, "u1").await.unwrap();
    assert!(first.valid);
    assert!(first.is_first_check);
    assert!(verifier.has_integrity_root("u1").await.unwrap());

    let second = verifier.verify_vault_integrity(&items, &key, "u1").await.unwrap();
    assert!(second.valid);
    assert!(!second.is_first_check);
}

#[tokio::test]
async fn tampered_or_missing_item_is_detected() {
    let verifier = verifier();
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    let items = vec![item_row("a", "v1", "blob-a"), item_row("b", "v1", "blob-b")];
    verifier.update_integrity_root(&items, &key, "u1").await.unwrap();

    let mut tampered = items.clone();
    tampered[1].encrypted_data = "blob-B".into();
    let check = verifier.verify_vault_integrity(&tampered, &key, "u1").await.unwrap();
    assert!(!check.valid);

    let removed = vec![items[0].clone()];
    let check = verifier.verify_vault_integrity(&removed, &key, "u1").await.unwrap();
    assert!(!check.valid);

    let mut added = items.clone();
    added.push(item_row("c", "v1", "blob-c"));
    let check = verifier.verify_vault_integrity(&added, &key, "u1").await.unwrap();
    assert!(!check.valid);

    // The untouched set still verifies; failed checks never move the baseline.
    let check = verifier.verify_vault_integrity(&items, &key, "u1").await.unwrap();
    assert!(check.valid);
}

#[tokio::test]
async fn tracked_update_moves_the_baseline() {
    let verifier = verifier();
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    let before = vec![item_row("a", "v1", "blob-a")];
    verifier.update_integrity_root(&before, &key, "u1").await.unwrap();

    let after = vec![item_row("a", "v1", "blob-a2"), item_row("b", "v1", "blob-b")];
    verifier.update_integrity_root(&after, &key, "u1").await.unwrap();

    assert!(verifier.verify_vault_integrity(&after, &key, "u1").await.unwrap().valid);
    assert!(!verifier.verify_vault_integrity(&before, &key, "u1").await.unwrap().valid);
}

#[tokio::test]
async fn wrong_integrity_key_fails_verification() {
    let verifier = verifier();
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    let other = verifier.derive_integrity_key(b"pw", &[2u8; 16]).unwrap();
    let items = vec![item_row("a", "v1", "blob-a")];

    verifier.update_integrity_root(&items, &key, "u1").await.unwrap();
    assert!(!verifier.verify_vault_integrity(&items, &other, "u1").await.unwrap().valid);
}

#[tokio::test]
async fn clear_resets_to_first_use() {
    let verifier = verifier();
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    verifier
        .update_integrity_root(&[item_row("a", "v1", "x")], &key, "u1")
        .await
        .unwrap();

    verifier.clear_integrity_root("u1").await.unwrap();
    assert!(!verifier.has_integrity_root("u1").await.unwrap());

    let check = verifier
        .verify_vault_integrity(&[item_row("z", "v1", "y")], &key, "u1")
        .await
        .unwrap();
    assert!(check.valid);
    assert!(check.is_first_check);
}

#[cfg(feature = "sqlite-store")]
#[tokio::test]
async fn roots_are_scoped_per_user_and_survive_reopen() {
    use tempfile::TempDir;
    use zkvault::storage::SqliteStore;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let items = vec![item_row("a", "v1", "blob-a")];

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let verifier = IntegrityVerifier::new(store, light_manager());
        let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
        verifier.update_integrity_root(&items, &key, "u1").await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let verifier = IntegrityVerifier::new(store, light_manager());
    let key = verifier.derive_integrity_key(b"pw", &[1u8; 16]).unwrap();
    assert!(verifier.has_integrity_root("u1").await.unwrap());
    assert!(!verifier.has_integrity_root("u2").await.unwrap());

    let check = verifier.verify_vault_integrity(&items, &key, "u1").await.unwrap();
    assert!(check.valid);
    assert!(!check.is_first_check);
}
