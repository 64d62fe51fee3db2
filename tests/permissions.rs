use std::cell::Cell;

use playerdb::access::{require, roles, Gated, Permission, REFUSAL_MESSAGE};
use playerdb::config::Config;
use playerdb::storage::{PlayerHandle, PlayerStore};
use tempfile::TempDir;

fn guest(store: &PlayerStore) -> PlayerHandle {
    store
        .fetch_or_create("U1", "Alice", "AliceAcct", "10.0.0.1", None)
        .unwrap()
}

#[test]
fn low_level_caller_is_refused_and_told() {
    let dir = TempDir::new().unwrap();
    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();
    let caller = guest(&store);
    let ran = Cell::new(false);
    let mut replies: Vec<String> = Vec::new();

    let outcome = Permission::new(roles::ADMIN)
        .run(&caller, &mut replies, || ran.set(true))
        .unwrap();

    assert!(outcome.is_refused());
    assert!(!ran.get());
    assert_eq!(replies, vec![REFUSAL_MESSAGE.to_string()]);
    assert_eq!(caller.access_level().unwrap(), roles::GUEST, "guard never mutates");
}

#[test]
fn sufficient_level_runs_the_action() {
    let dir = TempDir::new().unwrap();
    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();
    let caller = guest(&store);
    caller.set_access_level(roles::MODERATOR).unwrap();
    let mut replies: Vec<String> = Vec::new();

    let outcome = require(roles::MODERATOR, &caller, &mut replies, || 42).unwrap();

    assert_eq!(outcome, Gated::Allowed(42));
    assert!(replies.is_empty());
}

#[test]
fn guard_sees_level_changes_immediately() {
    let dir = TempDir::new().unwrap();
    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();
    let caller = guest(&store);
    let promoter = store.get_by_uuid("U1").unwrap().unwrap();
    let gate = Permission::new(roles::ADMIN);
    let mut replies: Vec<String> = Vec::new();

    assert!(!gate.permits(&caller).unwrap());
    promoter.set_access_level(roles::OWNER).unwrap();
    assert!(gate.permits(&caller).unwrap());
    assert_eq!(
        gate.run(&caller, &mut replies, || "done").unwrap().allowed(),
        Some("done")
    );
}

#[test]
fn default_permission_requires_owner() {
    assert_eq!(Permission::default().level(), roles::OWNER);
}
