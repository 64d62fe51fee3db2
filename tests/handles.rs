//! Read-through behaviour of player handles, roster queries and extension storage.
use std::collections::HashMap;

use playerdb::access::roles;
use playerdb::config::Config;
use playerdb::storage::{PlayerStore, StoreError};
use serde_json::json;
use tempfile::TempDir;

fn store(dir: &TempDir) -> PlayerStore {
    PlayerStore::new(&Config::with_player_db(dir.path())).expect("open store")
}

#[test]
fn writes_through_one_handle_are_seen_by_another() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let a = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();
    let b = store.get_by_uuid("U1").unwrap().unwrap();

    assert_eq!(b.planet().unwrap(), "");
    a.set_planet("alpha:12:-3").unwrap();
    assert_eq!(b.planet().unwrap(), "alpha:12:-3");

    b.set_muted(true).unwrap();
    assert!(a.muted().unwrap());

    a.set_title("[Captain] ").unwrap();
    b.set_on_ship(false).unwrap();
    let snap = a.snapshot().unwrap();
    assert_eq!(snap.title, "[Captain] ");
    assert!(!snap.on_ship);
    assert!(snap.muted);
}

#[test]
fn returning_login_is_visible_through_old_handle() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let held = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", Some("conn-1"))
        .unwrap();
    store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", Some("conn-2"))
        .unwrap();
    assert_eq!(held.protocol().unwrap().as_deref(), Some("conn-2"));
}

#[test]
fn handle_to_deleted_player_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let alice = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();
    assert!(store.delete(&alice).unwrap());
    assert!(matches!(alice.name(), Err(StoreError::NotFound(_))));
    assert!(alice.ips().unwrap().is_empty());
    assert!(!store.delete(&alice).unwrap(), "second delete is a no-op");
    assert!(store.get_by_name("Alice").unwrap().is_none());
    assert!(store.get_by_org_name("AliceAcct").unwrap().is_none());
}

#[test]
fn lookups_ignore_case() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let alice = store
        .fetch_or_create("AbC123", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();

    assert_eq!(store.get_by_name("aLiCe").unwrap(), Some(alice.clone()));
    assert_eq!(store.get_by_org_name("aliceacct").unwrap(), Some(alice.clone()));
    assert_eq!(store.get_by_uuid("abc123").unwrap(), Some(alice.clone()));
    assert_eq!(store.whois("ALICE").unwrap().map(|p| p.uuid), Some("AbC123".to_string()));
    assert!(store.whois("nobody").unwrap().is_none());
}

#[test]
fn logged_in_lookup_skips_offline_players() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let alice = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();
    assert!(store.get_logged_in_by_name("alice").unwrap().is_none());
    alice.log_in(2).unwrap();
    assert_eq!(store.get_logged_in_by_name("alice").unwrap(), Some(alice));
}

#[test]
fn all_like_uses_wildcards() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    for (uuid, name) in [("U1", "Alice"), ("U2", "Alfred"), ("U3", "Bob")] {
        store
            .fetch_or_create(uuid, name, name, "10.0.0.1", None)
            .unwrap();
    }
    let mut names: Vec<String> = store
        .all_like("al%")
        .unwrap()
        .iter()
        .map(|h| h.name().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Alfred", "Alice"]);
    assert_eq!(store.all_like("B_b").unwrap().len(), 1);
    assert_eq!(store.all_like("%").unwrap().len(), 3);
}

#[test]
fn case_sensitive_like_is_configurable() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::with_player_db(dir.path());
    config.storage.like_case_sensitive = true;
    let store = PlayerStore::new(&config).unwrap();
    store
        .fetch_or_create("U1", "Alice", "Alice", "10.0.0.1", None)
        .unwrap();
    assert!(store.all_like("al%").unwrap().is_empty());
    assert_eq!(store.all_like("Al%").unwrap().len(), 1);
}

#[test]
fn colored_name_follows_current_level() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let alice = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();
    let colors: HashMap<String, String> = [("guest", "<g>"), ("admin", "<a>"), ("default", "</>")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    assert_eq!(alice.colored_name(&colors).unwrap(), "<g>Alice</>");
    alice.set_access_level(roles::ADMIN).unwrap();
    assert_eq!(alice.rank().unwrap(), "ADMIN");
    assert_eq!(alice.colored_name(&colors).unwrap(), "<a>Alice</>");
}

#[test]
fn extension_storage_is_partitioned_by_feature() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let alice = store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap();
    let announcer = store.register_extension("planet_announcer").unwrap();
    let mail = store.register_extension("mail").unwrap();

    assert!(announcer.load(&alice).unwrap().is_empty());
    assert!(alice.plugin_storage().unwrap().contains_key("planet_announcer"));

    announcer.set(&alice, "visits", json!(3)).unwrap();
    mail.set(&alice, "unread", json!(["hi"])).unwrap();

    assert_eq!(announcer.get(&alice, "visits").unwrap(), Some(json!(3)));
    assert_eq!(announcer.get(&alice, "unread").unwrap(), None);
    assert_eq!(mail.get(&alice, "unread").unwrap(), Some(json!(["hi"])));

    announcer
        .modify(&alice, |map| {
            let visits = map.get("visits").and_then(|v| v.as_i64()).unwrap_or(0);
            map.insert("visits".into(), json!(visits + 1));
        })
        .unwrap();
    let other_handle = store.get_by_uuid("U1").unwrap().unwrap();
    assert_eq!(announcer.get(&other_handle, "visits").unwrap(), Some(json!(4)));

    assert_eq!(mail.remove(&alice, "unread").unwrap(), Some(json!(["hi"])));
    assert_eq!(mail.remove(&alice, "unread").unwrap(), None);
}

#[test]
fn extension_storage_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = store(&dir);
        let alice = store
            .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
            .unwrap();
        let ext = store.register_extension("notes").unwrap();
        let mut values = serde_json::Map::new();
        values.insert("note".into(), json!("friendly"));
        ext.replace(&alice, values).unwrap();
    }
    let store = store(&dir);
    let alice = store.get_by_uuid("U1").unwrap().unwrap();
    let ext = store.register_extension("notes").unwrap();
    assert_eq!(ext.get(&alice, "note").unwrap(), Some(json!("friendly")));
}
