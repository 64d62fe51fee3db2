//! Opening a store written by an older release.
use playerdb::config::Config;
use playerdb::storage::{PlayerStore, StoreError};
use serde_json::json;
use tempfile::TempDir;

fn write_legacy_player(dir: &std::path::Path, uuid: &str, name: &str, logged_in: bool) {
    let db = sled::open(dir).expect("db");
    let players = db.open_tree("players").expect("tree");
    let row = json!({
        "uuid": uuid,
        "name": name,
        "last_seen": "2019-06-01T12:00:00Z",
        "access_level": 100,
        "logged_in": logged_in,
        "protocol": "stale-conn",
        "client_id": 12,
        "ip": "10.1.1.1",
        "plugin_storage": null,
        "planet": "",
        "on_ship": false
    });
    players
        .insert(uuid.as_bytes(), serde_json::to_vec(&row).unwrap())
        .expect("insert");
    db.flush().expect("flush");
}

#[test]
fn legacy_rows_are_upgraded_and_indexed() {
    let dir = TempDir::new().unwrap();
    write_legacy_player(dir.path(), "OLD1", "Veteran", true);

    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();

    let vet = store.get_by_org_name("veteran").unwrap().expect("org back-filled");
    let p = vet.snapshot().unwrap();
    assert_eq!(p.org_name, "Veteran");
    assert_eq!(p.title, "");
    assert_eq!(p.access_level, 100);
    assert!(!p.logged_in, "stale session cleared on startup");
    assert_eq!(p.protocol, None);
    assert_eq!(store.get_by_name("VETERAN").unwrap(), Some(vet));
}

#[test]
fn returning_legacy_player_keeps_name_against_newcomer() {
    let dir = TempDir::new().unwrap();
    write_legacy_player(dir.path(), "OLD1", "Veteran", false);
    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();

    let newcomer = store
        .fetch_or_create("NEW1", "Veteran", "SomeoneElse", "10.2.2.2", None)
        .unwrap();
    let vet = store
        .fetch_or_create("OLD1", "Veteran", "Veteran", "10.1.1.1", None)
        .unwrap();

    assert_eq!(newcomer.name().unwrap(), "Veteran_");
    assert_eq!(vet.name().unwrap(), "Veteran");
}

#[test]
fn reopening_migrated_store_changes_nothing() {
    let dir = TempDir::new().unwrap();
    write_legacy_player(dir.path(), "OLD1", "Veteran", false);
    let first = {
        let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();
        store.get_by_uuid("OLD1").unwrap().unwrap().snapshot().unwrap()
    };
    let db = sled::open(dir.path()).unwrap();
    let report = playerdb::storage::migrate(&db).unwrap();
    assert!(report.is_noop());
    drop(db);

    let store = PlayerStore::new(&Config::with_player_db(dir.path())).unwrap();
    let again = store.get_by_uuid("OLD1").unwrap().unwrap().snapshot().unwrap();
    assert_eq!(first, again);
}

#[test]
fn corrupt_row_aborts_startup() {
    let dir = TempDir::new().unwrap();
    {
        let db = sled::open(dir.path()).unwrap();
        db.open_tree("players")
            .unwrap()
            .insert("BAD", &b"[1,2,3]"[..])
            .unwrap();
        db.flush().unwrap();
    }
    let result = PlayerStore::new(&Config::with_player_db(dir.path()));
    assert!(matches!(result, Err(StoreError::Migration(_))));
}
