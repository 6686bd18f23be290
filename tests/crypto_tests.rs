//! Integration tests for the symmetric cipher and key derivation.

mod common;

use zkvault::crypto::{decrypt, decrypt_string, encrypt, encrypt_string, RawKey};
use zkvault::errors::VaultCoreError;
use zkvault::vault::{decrypt_vault_item, encrypt_vault_item, VaultItemPayload};

use common::light_manager;

fn key(byte: u8) -> zkvault::crypto::KeyHandle {
    light_manager()
        .import_master_key(&RawKey::from_bytes([byte; 32]))
        .expect("import key")
}

// ---------------------------------------------------------------------------
// Encryption round-trip
// ---------------------------------------------------------------------------

#[test]
fn string_roundtrip_covers_empty_large_and_non_ascii() {
    let key = key(0xAB);
    let large = "x".repeat(16 * 1024);
    for plaintext in ["", large.as_str(), "pässwörd ✓ 密码 🔐"] {
        let blob = encrypt_string(&key, plaintext).expect("encrypt");
        assert_eq!(decrypt_string(&key, &blob).expect("decrypt"), plaintext);
    }
}

#[test]
fn encrypt_produces_different_ciphertext_each_time() {
    let key = key(0xCD);
    let plaintext = "SECRET=hello";

    let ct1 = encrypt_string(&key, plaintext).expect("encrypt 1");
    let ct2 = encrypt_string(&key, plaintext).expect("encrypt 2");

    // Each call generates a fresh nonce, so the outputs must differ.
    assert_ne!(ct1, ct2);
    assert_eq!(decrypt_string(&key, &ct1).unwrap(), plaintext);
    assert_eq!(decrypt_string(&key, &ct2).unwrap(), plaintext);
}

#[test]
fn decrypt_with_wrong_key_fails() {
    let blob = encrypt(&key(0x11), b"TOP_SECRET=42").expect("encrypt");
    assert!(matches!(
        decrypt(&key(0x22), &blob),
        Err(VaultCoreError::DecryptionFailed)
    ));
}

#[test]
fn any_flipped_byte_is_detected() {
    let key = key(0x33);
    let blob = encrypt(&key, b"account=1234").expect("encrypt");

    for i in 0..blob.len() {
        let mut tampered = blob.clone();
        tampered[i] ^= 0x01;
        assert!(
            matches!(decrypt(&key, &tampered), Err(VaultCoreError::DecryptionFailed)),
            "flip at byte {i} went unnoticed"
        );
    }
}

#[test]
fn decrypt_with_truncated_data_fails() {
    let key = key(0xAA);
    assert!(matches!(
        decrypt(&key, &[1u8; 5]),
        Err(VaultCoreError::DecryptionFailed)
    ));
    assert!(matches!(
        decrypt_string(&key, "%%% not base64"),
        Err(VaultCoreError::DecryptionFailed)
    ));
}

#[test]
fn vault_item_payload_roundtrip() {
    let key = key(0x44);
    let payload = VaultItemPayload {
        title: "Email".into(),
        username: Some("bob@example.com".into()),
        secret: Some("correct horse".into()),
        ..VaultItemPayload::default()
    };

    let blob = encrypt_vault_item(&payload, &key).expect("encrypt item");
    assert_eq!(decrypt_vault_item(&blob, &key).expect("decrypt item"), payload);
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

#[test]
fn derive_raw_key_is_deterministic() {
    let manager = light_manager();
    let salt = [9u8; 16];

    let a = manager.derive_raw_key(b"pw", &salt, 2).unwrap();
    let b = manager.derive_raw_key(b"pw", &salt, 2).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());

    let other_pw = manager.derive_raw_key(b"pw2", &salt, 2).unwrap();
    let other_salt = manager.derive_raw_key(b"pw", &[8u8; 16], 2).unwrap();
    assert_ne!(a.as_bytes(), other_pw.as_bytes());
    assert_ne!(a.as_bytes(), other_salt.as_bytes());
}

#[test]
fn unknown_kdf_version_is_rejected() {
    let manager = light_manager();
    assert!(matches!(
        manager.derive_raw_key(b"pw", &[0u8; 16], 99),
        Err(VaultCoreError::UnknownKdfVersion(99))
    ));
}

#[test]
fn verification_hash_accepts_only_matching_key() {
    let manager = light_manager();
    let salt = [1u8; 16];
    let key = manager.derive_key(b"pw", &salt, 2).unwrap();
    let hash = manager.create_verification_hash(&key);

    assert!(manager.verify_key(&hash, &key));
    let wrong = manager.derive_key(b"nope", &salt, 2).unwrap();
    assert!(!manager.verify_key(&hash, &wrong));
}

#[test]
fn kdf_upgrade_at_current_version_is_a_no_op() {
    let manager = light_manager();
    let upgrade = manager.attempt_kdf_upgrade(b"pw", &[2u8; 16], 2).unwrap();
    assert!(!upgrade.upgraded);
    assert_eq!(upgrade.active_version, 2);
    assert!(upgrade.new_key.is_none());
    assert!(upgrade.new_verifier.is_none());
}

#[test]
fn kdf_upgrade_from_older_version_yields_matching_verifier() {
    let manager = light_manager();
    let salt = [3u8; 16];
    let upgrade = manager.attempt_kdf_upgrade(b"pw", &salt, 1).unwrap();

    assert!(upgrade.upgraded);
    assert_eq!(upgrade.active_version, 2);
    let verifier = upgrade.new_verifier.expect("new verifier");

    let rederived = manager.derive_key(b"pw", &salt, 2).unwrap();
    assert!(manager.verify_key(&verifier, &rederived));
    assert!(manager.verify_key(&verifier, upgrade.new_key.as_ref().unwrap()));
}

#[test]
fn kdf_upgrade_rejects_unknown_stored_version() {
    let manager = light_manager();
    assert!(matches!(
        manager.attempt_kdf_upgrade(b"pw", &[0u8; 16], 0),
        Err(VaultCoreError::UnknownKdfVersion(0))
    ));
}
