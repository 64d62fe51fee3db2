//! Per-extension key/value storage carried on each player record.
//!
//! A feature that wants to remember things about players registers once and keeps the
//! returned [`Extension`]. The handle is bound to the feature's name, so a feature can
//! only see its own partition of a player's `plugin_storage` column. Every write
//! re-serializes the whole partition in one transaction.

use serde_json::{Map, Value};

use crate::storage::errors::StoreError;
use crate::storage::handle::PlayerHandle;

/// Capability for one feature's slice of player storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    name: String,
}

impl Extension {
    pub(crate) fn new(name: &str) -> Result<Self, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput(
                "extension name cannot be empty".into(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This extension's storage for `player`, created empty on first access.
    pub fn load(&self, player: &PlayerHandle) -> Result<Map<String, Value>, StoreError> {
        let current = player.snapshot()?;
        if let Some(map) = current.plugin_storage.get(&self.name) {
            return Ok(map.clone());
        }
        let updated = player.update(|p| {
            p.plugin_storage.entry(self.name.clone()).or_default();
        })?;
        Ok(updated
            .plugin_storage
            .get(&self.name)
            .cloned()
            .unwrap_or_default())
    }

    pub fn get(&self, player: &PlayerHandle, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load(player)?.get(key).cloned())
    }

    pub fn set(&self, player: &PlayerHandle, key: &str, value: Value) -> Result<(), StoreError> {
        self.modify(player, |map| {
            map.insert(key.to_string(), value.clone());
        })
    }

    /// Remove `key`; returns the value it held, if any.
    pub fn remove(&self, player: &PlayerHandle, key: &str) -> Result<Option<Value>, StoreError> {
        let previous = self.load(player)?.get(key).cloned();
        if previous.is_some() {
            self.modify(player, |map| {
                map.remove(key);
            })?;
        }
        Ok(previous)
    }

    /// Overwrite this extension's whole partition.
    pub fn replace(&self, player: &PlayerHandle, values: Map<String, Value>) -> Result<(), StoreError> {
        self.modify(player, |map| *map = values.clone())
    }

    /// Read-modify-write this extension's partition in one transaction.
    pub fn modify<F>(&self, player: &PlayerHandle, change: F) -> Result<(), StoreError>
    where
        F: Fn(&mut Map<String, Value>),
    {
        player
            .update(|p| change(p.plugin_storage.entry(self.name.clone()).or_default()))
            .map(|_| ())
    }
}
