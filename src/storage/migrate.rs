//! Startup schema evolution for stored player documents.
//!
//! There is no version table. Each player document is checked for a fixed set of
//! optional columns; a missing column is added with a backward-compatible value,
//! back-filled from an older column where one exists. Running the pass again on
//! migrated data changes nothing. Any other defect in a stored document (corrupt
//! JSON, wrong types, a missing required column) aborts startup.

use std::collections::BTreeMap;

use log::{debug, info};
use serde_json::{Map, Value};

use crate::storage::errors::StoreError;
use crate::storage::models::Player;
use crate::storage::tables::players_tree;

/// A column added after the first release, with the value existing rows receive.
struct OptionalColumn {
    name: &'static str,
    backfill: fn(&Map<String, Value>) -> Value,
}

fn org_name_from_name(row: &Map<String, Value>) -> Value {
    row.get("name")
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

fn empty_string(_: &Map<String, Value>) -> Value {
    Value::String(String::new())
}

fn unset_flag(_: &Map<String, Value>) -> Value {
    Value::Bool(false)
}

fn empty_object(_: &Map<String, Value>) -> Value {
    Value::Object(Map::new())
}

const OPTIONAL_COLUMNS: &[OptionalColumn] = &[
    OptionalColumn {
        name: "org_name",
        backfill: org_name_from_name,
    },
    OptionalColumn {
        name: "title",
        backfill: empty_string,
    },
    OptionalColumn {
        name: "muted",
        backfill: unset_flag,
    },
    OptionalColumn {
        name: "plugin_storage",
        backfill: empty_object,
    },
];

/// What a migration pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub examined: usize,
    pub migrated: usize,
    /// Column name -> number of rows that received it.
    pub columns_added: BTreeMap<&'static str, usize>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.migrated == 0
    }
}

/// Bring every stored player document up to the current column set.
pub fn migrate(db: &sled::Db) -> Result<MigrationReport, StoreError> {
    let players = players_tree(db)?;
    let mut report = MigrationReport::default();

    for entry in players.iter() {
        let (key, bytes) = entry?;
        let label = String::from_utf8_lossy(&key).into_owned();
        report.examined += 1;

        let mut row = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(row)) => row,
            Ok(_) => {
                return Err(StoreError::Migration(format!(
                    "player {} is not a JSON object",
                    label
                )))
            }
            Err(e) => {
                return Err(StoreError::Migration(format!(
                    "player {} is unreadable: {}",
                    label, e
                )))
            }
        };

        let mut changed = false;
        for column in OPTIONAL_COLUMNS {
            if !row.contains_key(column.name) {
                let value = (column.backfill)(&row);
                row.insert(column.name.to_string(), value);
                *report.columns_added.entry(column.name).or_insert(0) += 1;
                changed = true;
            }
        }
        changed |= normalize_plugin_storage(&mut row, &label)?;

        let value = Value::Object(row);
        if let Err(e) = serde_json::from_value::<Player>(value.clone()) {
            return Err(StoreError::Migration(format!(
                "player {} does not match the current schema: {}",
                label, e
            )));
        }

        if changed {
            players.insert(&key, serde_json::to_vec(&value)?)?;
            report.migrated += 1;
            debug!("migrated player record {}", label);
        }
    }

    if !report.is_noop() {
        players.flush()?;
        for (column, count) in &report.columns_added {
            info!("Added column '{}' to {} player record(s)", column, count);
        }
        info!(
            "Player schema migration updated {} of {} record(s)",
            report.migrated, report.examined
        );
    }
    Ok(report)
}

/// Older stores kept per-extension storage as a JSON string, or null when never used.
fn normalize_plugin_storage(row: &mut Map<String, Value>, label: &str) -> Result<bool, StoreError> {
    let replacement = match row.get("plugin_storage") {
        Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(Value::Null) => Value::Object(Map::new()),
            _ => {
                return Err(StoreError::Migration(format!(
                    "player {} has unreadable plugin storage",
                    label
                )))
            }
        },
        _ => return Ok(false),
    };
    row.insert("plugin_storage".to_string(), replacement);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn legacy_row() -> Value {
        json!({
            "uuid": "abc",
            "name": "Alice",
            "last_seen": "2020-01-01T00:00:00Z",
            "access_level": 0,
            "logged_in": false,
            "protocol": null,
            "client_id": -1,
            "ip": "10.0.0.1",
            "plugin_storage": null,
            "planet": "",
            "on_ship": true
        })
    }

    fn seed(db: &sled::Db, uuid: &str, row: &Value) {
        players_tree(db)
            .unwrap()
            .insert(uuid.as_bytes(), serde_json::to_vec(row).unwrap())
            .unwrap();
    }

    #[test]
    fn backfills_missing_columns() {
        let dir = TempDir::new().expect("tempdir");
        let db = sled::open(dir.path()).expect("db");
        seed(&db, "abc", &legacy_row());

        let report = migrate(&db).expect("migrate");
        assert_eq!(report.examined, 1);
        assert_eq!(report.migrated, 1);
        assert_eq!(report.columns_added.get("org_name"), Some(&1));
        assert_eq!(report.columns_added.get("title"), Some(&1));

        let bytes = players_tree(&db).unwrap().get("abc").unwrap().unwrap();
        let player: Player = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(player.org_name, "Alice");
        assert_eq!(player.title, "");
        assert!(!player.muted);
        assert!(player.plugin_storage.is_empty());
    }

    #[test]
    fn second_run_is_a_noop() {
        let dir = TempDir::new().expect("tempdir");
        let db = sled::open(dir.path()).expect("db");
        seed(&db, "abc", &legacy_row());
        migrate(&db).expect("first run");
        let report = migrate(&db).expect("second run");
        assert!(report.is_noop());
        assert_eq!(report.examined, 1);
    }

    #[test]
    fn string_encoded_plugin_storage_is_unpacked() {
        let dir = TempDir::new().expect("tempdir");
        let db = sled::open(dir.path()).expect("db");
        let mut row = legacy_row();
        row["plugin_storage"] = json!(r#"{"announcer":{"seen":true}}"#);
        seed(&db, "abc", &row);
        migrate(&db).expect("migrate");
        let bytes = players_tree(&db).unwrap().get("abc").unwrap().unwrap();
        let player: Player = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(player.plugin_storage["announcer"]["seen"], json!(true));
    }

    #[test]
    fn corrupt_record_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let db = sled::open(dir.path()).expect("db");
        players_tree(&db)
            .unwrap()
            .insert("abc", &b"{not json"[..])
            .unwrap();
        assert!(matches!(migrate(&db), Err(StoreError::Migration(_))));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let db = sled::open(dir.path()).expect("db");
        let mut row = legacy_row();
        row.as_object_mut().unwrap().remove("access_level");
        seed(&db, "abc", &row);
        assert!(matches!(migrate(&db), Err(StoreError::Migration(_))));
    }
}
