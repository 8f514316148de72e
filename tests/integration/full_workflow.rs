//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle:
//! 1. Register an account card and device cards
//! 2. Look users up through each filter
//! 3. Rotate a device key and follow it through the cache
//! 4. Verify published cards and detect tampering
//! 5. Unregister and check revocation

use std::collections::BTreeMap;

use card_identity::card::{verify_card, SELF_SIGNER, SERVICE_SIGNER};
use card_identity::{
    CardClient, CardError, CardFilter, CardKeyPair, CardManager, ClientConfig, KdfParams,
    ACCOUNT_CARD_FIELD, IDENTITY_ID_FIELD,
};

/// Client for `identity` keeping its key under `prefix`, one per device.
fn open_with_prefix(config: &ClientConfig, prefix: &str, identity: &str) -> CardClient {
    CardClient::open(&config.clone().with_key_prefix(prefix), identity).unwrap()
}

fn account_fields() -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert(ACCOUNT_CARD_FIELD.to_string(), "true".to_string());
    fields
}

fn device_fields(device: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert(ACCOUNT_CARD_FIELD.to_string(), "false".to_string());
    fields.insert(IDENTITY_ID_FIELD.to_string(), device.to_string());
    fields
}

#[test]
fn full_workflow_register_to_unregister() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());

    // ── Step 1: Register account and devices ────────────────────────────
    let mut bob_account = open_with_prefix(&config, "account", "bob");
    let account_card = bob_account
        .register(None, &CardFilter::Account, account_fields())
        .unwrap();

    let mut bob_phone = open_with_prefix(&config, "phone", "bob");
    let phone_card = bob_phone
        .register(None, &CardFilter::device_id("phone"), device_fields("phone"))
        .unwrap();

    let mut bob_laptop = open_with_prefix(&config, "laptop", "bob");
    let laptop_card = bob_laptop
        .register(None, &CardFilter::device_id("laptop"), device_fields("laptop"))
        .unwrap();

    // A second account card is refused; the device cards do not count.
    let mut stray = open_with_prefix(&config, "stray", "bob");
    assert!(matches!(
        stray.register(None, &CardFilter::Account, account_fields()),
        Err(CardError::UserAlreadyRegistered)
    ));

    // ── Step 2: Look bob up through each filter ─────────────────────────
    let mut alice = CardClient::open(&config, "alice").unwrap();
    alice.register(None, &CardFilter::Account, account_fields()).unwrap();

    let account = alice.find_user("bob", false, &CardFilter::Account).unwrap();
    assert_eq!(account.id, account_card.id);

    let phone = alice
        .find_user("bob", true, &CardFilter::device_id("phone"))
        .unwrap();
    assert_eq!(phone.id, phone_card.id);

    let keys = alice
        .lookup_public_keys(["bob", "alice"], &CardFilter::Account)
        .unwrap();
    assert_eq!(keys["bob"], account_card.public_key);

    assert!(matches!(
        alice.find_user("bob", true, &CardFilter::All),
        Err(CardError::DuplicateCards(_))
    ));

    // ── Step 3: Rotate the laptop key ───────────────────────────────────
    alice
        .find_user("bob", true, &CardFilter::device_id("laptop"))
        .unwrap();
    bob_laptop.cleanup().unwrap();
    let rotated = bob_laptop
        .rotate_private_key(device_fields("laptop"), &CardFilter::device_id("laptop"))
        .unwrap();
    assert_eq!(rotated.previous_card_id, Some(laptop_card.id.clone()));

    assert_eq!(alice.update_cached_users().unwrap(), 1);
    assert_eq!(alice.find_cached_user("bob").unwrap().id, rotated.id);

    let bob_cards = alice.card_manager().search_cards("bob").unwrap();
    assert_eq!(bob_cards.len(), 3);
    let laptop = bob_cards.iter().find(|c| c.id == rotated.id).unwrap();
    let previous = laptop.previous_card.as_ref().unwrap();
    assert_eq!(previous.id, laptop_card.id);
    assert!(previous.is_outdated);

    // ── Step 4: Verify published cards ──────────────────────────────────
    let manager = CardManager::open(&config).unwrap();
    for card in &bob_cards {
        let report = manager.verifier().verify(card).unwrap();
        assert!(report.is_valid, "{} should verify: {:?}", card.id, report.failure());
        assert!(card.signature_by(SELF_SIGNER).is_some());
        assert!(card.signature_by(SERVICE_SIGNER).is_some());
    }

    let mut forged = account.clone();
    forged.signatures[0]
        .extra_fields
        .insert(ACCOUNT_CARD_FIELD.to_string(), "false".to_string());
    let report = verify_card(&forged).unwrap();
    assert!(!report.self_signature_valid);
    assert!(!report.is_valid);

    // ── Step 5: Unregister ──────────────────────────────────────────────
    let revoked = bob_laptop.unregister(&CardFilter::device_id("laptop")).unwrap();
    assert_eq!(revoked, vec![rotated.id.clone(), laptop_card.id.clone()]);
    assert!(!bob_laptop.has_local_private_key());

    assert_eq!(alice.update_cached_users().unwrap(), 1);
    assert!(alice.find_cached_user("bob").is_none());

    // Account and phone cards remain.
    let remaining = alice.card_manager().search_cards("bob").unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(alice.find_user("bob", true, &CardFilter::Account).is_ok());
    assert!(matches!(
        alice.find_user("bob", true, &CardFilter::device_id("laptop")),
        Err(CardError::UsersNotFound(_))
    ));
}

#[test]
fn workflow_register_with_imported_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let kp = CardKeyPair::generate();
    let restored = CardKeyPair::from_private_key_base64(&kp.private_key_base64()).unwrap();

    let mut carol = CardClient::open(&config, "carol").unwrap();
    let card = carol
        .register(Some(restored), &CardFilter::All, BTreeMap::new())
        .unwrap();
    assert_eq!(card.public_key, kp.public_key_base64());
    assert_eq!(carol.local_key_pair().unwrap().key_id(), kp.key_id());
}

#[test]
fn workflow_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());

    let card = {
        let mut dave = CardClient::open(&config, "dave").unwrap();
        dave.register(None, &CardFilter::All, account_fields()).unwrap()
    };

    let reopened = CardClient::open(&config, "dave").unwrap();
    assert!(reopened.has_local_private_key());
    assert_eq!(reopened.local_key_pair().unwrap().public_key_base64(), card.public_key);

    let first = CardManager::open(&config).unwrap();
    let second = CardManager::open(&config).unwrap();
    assert_eq!(first.service_public_key(), second.service_public_key());
    assert_eq!(second.get_card(&card.id).unwrap().id, card.id);
}

#[test]
fn workflow_recover_device_key_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path()).with_backup_kdf(KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    });
    let phone = CardFilter::device_id("phone");

    let mut bob = open_with_prefix(&config, "phone", "bob");
    let card = bob.register(None, &phone, device_fields("phone")).unwrap();
    bob.backup_private_key("bob's password").unwrap();

    // The device loses its key, then gets it back from the backup.
    bob.cleanup().unwrap();
    let mut bob = open_with_prefix(&config, "phone", "bob");
    assert!(!bob.has_local_private_key());
    assert!(bob.has_private_key_backup());
    assert!(matches!(
        bob.restore_private_key("guess"),
        Err(CardError::InvalidPassword)
    ));
    let restored = bob.restore_private_key("bob's password").unwrap();
    assert_eq!(restored.public_key_base64(), card.public_key);

    // The restored key still matches the published card.
    let mut alice = CardClient::open(&config, "alice").unwrap();
    let found = alice.find_user("bob", false, &phone).unwrap();
    assert_eq!(found.id, card.id);

    // A fresh backup needs the old one reset first.
    assert!(matches!(
        bob.backup_private_key("new password"),
        Err(CardError::BackupAlreadyExists(_))
    ));
    bob.reset_private_key_backup().unwrap();
    bob.backup_private_key("new password").unwrap();

    // Another device of the same identity has its own backup slot.
    let laptop = open_with_prefix(&config, "laptop", "bob");
    assert!(!laptop.has_private_key_backup());
}
