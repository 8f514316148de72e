//! Stress test: long rotation chains, history linking and chain revocation.

use std::collections::BTreeMap;

use card_identity::{
    accept_account, accept_device_id, CardClient, CardError, CardFilter, CardId, CardManager,
    ClientConfig, IDENTITY_ID_FIELD,
};

const ROTATIONS: usize = 25;

fn device_fields(device: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert(IDENTITY_ID_FIELD.to_string(), device.to_string());
    fields
}

/// Register the client's identity and rotate it `rotations` times, returning every
/// card ID oldest first.
fn rotate_many(client: &mut CardClient, filter: &CardFilter, rotations: usize) -> Vec<CardId> {
    let fields = match filter {
        CardFilter::DeviceId(id) => device_fields(id),
        _ => BTreeMap::new(),
    };
    let mut ids = vec![client.register(None, filter, fields.clone()).unwrap().id];
    for _ in 0..rotations {
        client.cleanup().unwrap();
        let card = client.rotate_private_key(fields.clone(), filter).unwrap();
        assert_eq!(card.previous_card_id.as_ref(), ids.last());
        ids.push(card.id);
    }
    ids
}

#[test]
fn stress_long_rotation_chain_links_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut alice = CardClient::open(&ClientConfig::new(dir.path()), "alice").unwrap();
    let ids = rotate_many(&mut alice, &CardFilter::All, ROTATIONS);
    assert_eq!(ids.len(), ROTATIONS + 1);

    let cards = alice.own_cards().unwrap();
    assert_eq!(cards.len(), 1, "only the newest card is current");
    let newest = &cards[0];

    let history: Vec<&CardId> = newest.history().map(|c| &c.id).collect();
    let expected: Vec<&CardId> = ids.iter().rev().collect();
    assert_eq!(history, expected);

    assert!(!newest.is_outdated);
    assert!(newest.history().skip(1).all(|c| c.is_outdated));
}

#[test]
fn stress_history_filter_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let mut alice = CardClient::open(&ClientConfig::new(dir.path()), "alice").unwrap();
    let filter = CardFilter::device_id("phone");
    rotate_many(&mut alice, &filter, 5);

    let cards = alice.own_cards().unwrap();
    let newest = &cards[0];
    assert!(accept_device_id("phone", newest));
    for old in newest.history().skip(1) {
        assert!(!accept_device_id("phone", old), "outdated cards never match a device");
        assert!(accept_account(old), "outdated cards always pass the account filter");
    }
}

#[test]
fn stress_only_newest_card_can_be_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let mut alice = CardClient::open(&config, "alice").unwrap();
    let ids = rotate_many(&mut alice, &CardFilter::All, 3);

    let manager = CardManager::open(&config).unwrap();
    let kp = card_identity::CardKeyPair::generate();
    let fork = card_identity::CardBuilder::new("alice", &kp)
        .previous_card_id(ids[1].clone())
        .build()
        .unwrap();
    let result = manager.publish_card(fork);
    assert!(matches!(result, Err(CardError::CardAlreadyReplaced(ref id)) if *id == ids[1].0));
}

#[test]
fn stress_revoke_chain_from_newest() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let mut alice = CardClient::open(&config, "alice").unwrap();
    let ids = rotate_many(&mut alice, &CardFilter::All, 10);

    let manager = CardManager::open(&config).unwrap();
    let outdated = manager.revoke_card(&ids[3]);
    assert!(matches!(outdated, Err(CardError::CardAlreadyReplaced(_))));

    let revoked = alice.unregister(&CardFilter::All).unwrap();
    let expected: Vec<CardId> = ids.iter().rev().cloned().collect();
    assert_eq!(revoked, expected);
    assert!(alice.own_cards().unwrap().is_empty());
    for id in &ids {
        assert!(matches!(manager.get_card(id), Err(CardError::NotFound(_))));
    }
}

#[test]
fn stress_many_identities_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let names: Vec<String> = (0..20).map(|i| format!("user-{i}")).collect();

    for name in &names {
        let mut client = CardClient::open(&config, name.as_str()).unwrap();
        rotate_many(&mut client, &CardFilter::All, 2);
    }

    let mut reader = CardClient::open(&config, "reader").unwrap();
    let keys = reader.lookup_public_keys(&names, &CardFilter::All).unwrap();
    assert_eq!(keys.len(), names.len());

    let manager = CardManager::open(&config).unwrap();
    for name in &names {
        let cards = manager.search_cards(name).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].history().count(), 3);
        assert_eq!(keys[name], cards[0].public_key);
    }
}

#[test]
fn stress_cache_follows_rotations() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let mut bob = CardClient::open(&config, "bob").unwrap();
    let mut alice = CardClient::open(&config, "alice").unwrap();

    bob.register(None, &CardFilter::All, BTreeMap::new()).unwrap();
    alice.find_user("bob", false, &CardFilter::All).unwrap();

    for _ in 0..5 {
        bob.cleanup().unwrap();
        let rotated = bob.rotate_private_key(BTreeMap::new(), &CardFilter::All).unwrap();
        assert_eq!(alice.update_cached_users().unwrap(), 1);
        assert_eq!(alice.find_cached_user("bob").unwrap().id, rotated.id);
    }
    assert_eq!(alice.update_cached_users().unwrap(), 0);

    bob.unregister(&CardFilter::All).unwrap();
    assert_eq!(alice.update_cached_users().unwrap(), 1);
    assert!(alice.find_cached_user("bob").is_none());
}

#[test]
fn stress_concurrent_searches_share_manager() {
    use std::sync::Arc;
    use std::thread;

    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new(dir.path());
    let mut alice = CardClient::open(&config, "alice").unwrap();
    let ids = rotate_many(&mut alice, &CardFilter::All, 4);
    let newest = ids.last().cloned().unwrap();

    let manager = Arc::new(CardManager::open(&config).unwrap());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let newest = newest.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                let cards = manager.search_cards("alice").unwrap();
                assert_eq!(cards.len(), 1);
                assert_eq!(cards[0].id, newest);
                assert_eq!(cards[0].history().count(), 5);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}
