//! Read-through handles returned by the store.
//!
//! A handle keeps only the record's key. Every accessor opens its own transaction,
//! loads the current persisted record and reads or writes one field, so a handle
//! held for the length of a connection never serves stale data. Two accessor calls
//! are two transactions; use [`PlayerHandle::update`] when several fields must
//! change together.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;

use crate::logutil::escape_log;
use crate::storage::errors::StoreError;
use crate::storage::models::{Ban, IpAddress, Player, PluginStorage, NO_CLIENT_ID};
use crate::storage::tables::{abort, Tables};

/// Handle to one stored player, keyed by uuid.
#[derive(Clone)]
pub struct PlayerHandle {
    tables: Tables,
    uuid: String,
}

impl fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerHandle").field("uuid", &self.uuid).finish()
    }
}

impl PartialEq for PlayerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl PlayerHandle {
    pub(crate) fn new(tables: Tables, uuid: impl Into<String>) -> Self {
        Self {
            tables,
            uuid: uuid.into(),
        }
    }

    /// The uuid never changes, so it is the one field served without a reload.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Fresh copy of the whole record.
    pub fn snapshot(&self) -> Result<Player, StoreError> {
        let uuid = self.uuid.as_str();
        self.tables.transaction(|tx| tx.require_player(uuid))
    }

    /// Load the record, apply `change` and persist it, all in one transaction.
    ///
    /// `change` may run more than once if the transaction is retried.
    pub fn update<F>(&self, change: F) -> Result<Player, StoreError>
    where
        F: Fn(&mut Player),
    {
        let uuid = self.uuid.as_str();
        self.tables.transaction(|tx| {
            let mut player = tx.require_player(uuid)?;
            change(&mut player);
            if player.uuid != uuid {
                return Err(abort(StoreError::InvalidInput(
                    "a player's uuid cannot be changed".into(),
                )));
            }
            tx.put_player(&player)?;
            Ok(player)
        })
    }

    pub fn name(&self) -> Result<String, StoreError> {
        Ok(self.snapshot()?.name)
    }

    pub fn set_name(&self, name: &str) -> Result<(), StoreError> {
        debug!("renaming {} to {}", self.uuid, escape_log(name));
        self.update(|p| p.name = name.to_string()).map(|_| ())
    }

    pub fn org_name(&self) -> Result<String, StoreError> {
        Ok(self.snapshot()?.org_name)
    }

    pub fn set_org_name(&self, org_name: &str) -> Result<(), StoreError> {
        self.update(|p| p.org_name = org_name.to_string()).map(|_| ())
    }

    pub fn last_seen(&self) -> Result<DateTime<Utc>, StoreError> {
        Ok(self.snapshot()?.last_seen)
    }

    pub fn set_last_seen(&self, when: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(|p| p.last_seen = when).map(|_| ())
    }

    pub fn access_level(&self) -> Result<i32, StoreError> {
        Ok(self.snapshot()?.access_level)
    }

    pub fn set_access_level(&self, level: i32) -> Result<(), StoreError> {
        self.update(|p| p.access_level = level).map(|_| ())
    }

    pub fn logged_in(&self) -> Result<bool, StoreError> {
        Ok(self.snapshot()?.logged_in)
    }

    pub fn set_logged_in(&self, logged_in: bool) -> Result<(), StoreError> {
        self.update(|p| p.logged_in = logged_in).map(|_| ())
    }

    pub fn protocol(&self) -> Result<Option<String>, StoreError> {
        Ok(self.snapshot()?.protocol)
    }

    pub fn set_protocol(&self, protocol: Option<&str>) -> Result<(), StoreError> {
        self.update(|p| p.protocol = protocol.map(str::to_string))
            .map(|_| ())
    }

    pub fn client_id(&self) -> Result<i64, StoreError> {
        Ok(self.snapshot()?.client_id)
    }

    pub fn set_client_id(&self, client_id: i64) -> Result<(), StoreError> {
        self.update(|p| p.client_id = client_id).map(|_| ())
    }

    /// Last IP address the player connected from.
    pub fn ip(&self) -> Result<String, StoreError> {
        Ok(self.snapshot()?.ip)
    }

    pub fn planet(&self) -> Result<String, StoreError> {
        Ok(self.snapshot()?.planet)
    }

    pub fn set_planet(&self, planet: &str) -> Result<(), StoreError> {
        self.update(|p| p.planet = planet.to_string()).map(|_| ())
    }

    pub fn on_ship(&self) -> Result<bool, StoreError> {
        Ok(self.snapshot()?.on_ship)
    }

    pub fn set_on_ship(&self, on_ship: bool) -> Result<(), StoreError> {
        self.update(|p| p.on_ship = on_ship).map(|_| ())
    }

    pub fn muted(&self) -> Result<bool, StoreError> {
        Ok(self.snapshot()?.muted)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), StoreError> {
        self.update(|p| p.muted = muted).map(|_| ())
    }

    pub fn title(&self) -> Result<String, StoreError> {
        Ok(self.snapshot()?.title)
    }

    pub fn set_title(&self, title: &str) -> Result<(), StoreError> {
        self.update(|p| p.title = title.to_string()).map(|_| ())
    }

    /// Rank name for the current access level.
    pub fn rank(&self) -> Result<&'static str, StoreError> {
        Ok(self.snapshot()?.rank())
    }

    /// See [`Player::colored_name`].
    pub fn colored_name(&self, colors: &HashMap<String, String>) -> Result<String, StoreError> {
        Ok(self.snapshot()?.colored_name(colors))
    }

    /// Whole per-extension storage column. Extensions normally go through
    /// [`crate::storage::Extension`] instead.
    pub fn plugin_storage(&self) -> Result<PluginStorage, StoreError> {
        Ok(self.snapshot()?.plugin_storage)
    }

    /// Every IP address recorded for this player, oldest first.
    pub fn ips(&self) -> Result<Vec<IpAddress>, StoreError> {
        self.tables.scan_ips(&self.uuid)
    }

    /// Mark the player as connected on `client_id`.
    pub fn log_in(&self, client_id: i64) -> Result<(), StoreError> {
        self.update(|p| {
            p.logged_in = true;
            p.client_id = client_id;
            p.last_seen = Utc::now();
        })
        .map(|_| ())
    }

    /// Clear the connection state when the player disconnects.
    pub fn log_out(&self) -> Result<(), StoreError> {
        self.update(|p| {
            p.logged_in = false;
            p.protocol = None;
            p.client_id = NO_CLIENT_ID;
            p.last_seen = Utc::now();
        })
        .map(|_| ())
    }
}

/// Handle to one ban row, keyed by the banned IP or org name.
#[derive(Clone)]
pub struct BanHandle {
    tables: Tables,
    key: String,
}

impl fmt::Debug for BanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BanHandle").field("key", &self.key).finish()
    }
}

impl BanHandle {
    pub(crate) fn new(tables: Tables, key: impl Into<String>) -> Self {
        Self {
            tables,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> Result<Ban, StoreError> {
        let key = self.key.as_str();
        self.tables.transaction(|tx| {
            tx.ban(key)?
                .ok_or_else(|| abort(StoreError::NotFound(format!("ban: {}", key))))
        })
    }

    pub fn id(&self) -> Result<u64, StoreError> {
        Ok(self.snapshot()?.id)
    }

    pub fn reason(&self) -> Result<Option<String>, StoreError> {
        Ok(self.snapshot()?.reason)
    }

    pub fn set_reason(&self, reason: Option<&str>) -> Result<(), StoreError> {
        let key = self.key.as_str();
        self.tables.transaction(|tx| {
            let mut ban = tx
                .ban(key)?
                .ok_or_else(|| abort(StoreError::NotFound(format!("ban: {}", key))))?;
            ban.reason = reason.map(str::to_string);
            tx.put_ban(&ban)
        })
    }
}
