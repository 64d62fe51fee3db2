//! # Storage Module - Player Records, IP History and Bans
//!
//! [`PlayerStore`] is the identity and session store used by the proxy's connection
//! loop. It persists players, the IP addresses they connected from and the ban list
//! in an embedded sled database.
//!
//! ## Layout
//!
//! ```text
//! <player_db>/
//! ├── players           uuid -> Player (JSON)
//! ├── ips               uuid \0 ip -> IpAddress (JSON)
//! ├── bans              ip or org name -> Ban (JSON)
//! ├── players_by_name   lowercase name -> [uuid, ...]
//! └── players_by_org    lowercase org name -> [uuid, ...]
//! ```
//!
//! ## Access model
//!
//! Every public operation runs in exactly one transaction and returns plain values or
//! handles ([`PlayerHandle`], [`BanHandle`]). Handles hold only a key and reload the
//! record on each access, so a write committed through one handle is visible on the
//! very next read through any other handle to the same record.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use playerdb::config::Config;
//! use playerdb::storage::PlayerStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let store = PlayerStore::new(&config)?;
//!
//!     let player = store.fetch_or_create("0123abcd", "Alice", "alice", "10.0.0.1", Some("conn-1"))?;
//!     player.log_in(7)?;
//!     println!("{} is {}", player.name()?, player.rank()?);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod extension;
pub mod handle;
pub mod migrate;
pub mod models;
pub mod pattern;
mod tables;

use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};

use crate::access::roles;
use crate::config::Config;
use crate::logutil::escape_log;

pub use errors::StoreError;
pub use extension::Extension;
pub use handle::{BanHandle, PlayerHandle};
pub use migrate::{migrate, MigrationReport};
pub use models::{Ban, IpAddress, Player, PluginStorage, MAX_IP_LEN, NO_CLIENT_ID};

use tables::{abort, Tables, Tx, TxResult};

/// What `fetch_or_create` did, for logging once the transaction has committed.
enum LoginOutcome {
    Created,
    Returning { renamed_from: Option<String> },
}

/// The player store.
pub struct PlayerStore {
    tables: Tables,
    owner_uuid: String,
    name_retry_limit: u32,
    like_case_sensitive: bool,
}

impl PlayerStore {
    /// Open (or create) the store at `config.storage.player_db`.
    ///
    /// Runs the schema migration, reconciles the name indexes and marks every player as
    /// logged out, since nobody can still be connected from a previous run.
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let path = Path::new(&config.storage.player_db);
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Self::with_db(db, config)
    }

    /// Like [`PlayerStore::new`] over an already opened database.
    pub fn with_db(db: sled::Db, config: &Config) -> Result<Self, StoreError> {
        migrate(&db)?;
        let tables = Tables::open(db)?;
        let indexed = tables.reconcile_indexes()?;
        let store = Self {
            tables,
            owner_uuid: config.server.owner_uuid.clone(),
            name_retry_limit: config.server.name_retry_limit,
            like_case_sensitive: config.storage.like_case_sensitive,
        };
        let reset = store.reset_sessions()?;
        info!(
            "Player store ready: {} player(s), {} stale session(s) cleared",
            indexed, reset
        );
        Ok(store)
    }

    fn reset_sessions(&self) -> Result<usize, StoreError> {
        let stale: Vec<String> = self
            .tables
            .scan_players()?
            .into_iter()
            .filter(|p| p.logged_in || p.protocol.is_some())
            .map(|p| p.uuid)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        self.tables.transaction(|tx| {
            for uuid in &stale {
                if let Some(mut player) = tx.player(uuid)? {
                    player.logged_in = false;
                    player.protocol = None;
                    tx.put_player(&player)?;
                }
            }
            Ok(stale.len())
        })
    }

    fn handle(&self, uuid: impl Into<String>) -> PlayerHandle {
        PlayerHandle::new(self.tables.clone(), uuid)
    }

    fn handles(&self, players: Vec<Player>) -> Vec<PlayerHandle> {
        players.into_iter().map(|p| self.handle(p.uuid)).collect()
    }

    /// Look up the player logging in, creating the record on first sight.
    ///
    /// Refuses uuids that are already logged in and banned IPs or org names before
    /// touching anything. A display name already held by a different account gets
    /// underscores appended until it is free; a returning account (same org name)
    /// keeps its name. The caller marks the player logged in separately.
    ///
    /// Not safe to retry blindly: a retry can resolve to a different name.
    pub fn fetch_or_create(
        &self,
        uuid: &str,
        name: &str,
        org_name: &str,
        ip: &str,
        protocol: Option<&str>,
    ) -> Result<PlayerHandle, StoreError> {
        if ip.len() > MAX_IP_LEN {
            return Err(StoreError::InvalidInput(format!(
                "ip address longer than {} characters",
                MAX_IP_LEN
            )));
        }
        let ip_id = self.tables.next_id()?;

        let result = self.tables.transaction(|tx| {
            let existing = tx.player(uuid)?;
            if existing.as_ref().is_some_and(|p| p.logged_in) {
                return Err(abort(StoreError::AlreadyLoggedIn(uuid.to_string())));
            }
            if tx.ban(ip)?.is_some() {
                return Err(abort(StoreError::Banned(ip.to_string())));
            }
            if tx.ban(org_name)?.is_some() {
                return Err(abort(StoreError::Banned(org_name.to_string())));
            }

            let name = self.resolve_name(tx, name, org_name)?;
            let now = Utc::now();
            let (mut player, outcome) = match existing {
                Some(mut player) => {
                    let renamed_from = if player.name != name {
                        Some(std::mem::replace(&mut player.name, name))
                    } else {
                        None
                    };
                    if !tx.has_ip(uuid, ip)? {
                        tx.put_ip(&IpAddress {
                            id: ip_id,
                            ip: ip.to_string(),
                            uuid: uuid.to_string(),
                        })?;
                        player.ip = ip.to_string();
                    }
                    player.protocol = protocol.map(str::to_string);
                    player.last_seen = now;
                    (player, LoginOutcome::Returning { renamed_from })
                }
                None => {
                    tx.put_ip(&IpAddress {
                        id: ip_id,
                        ip: ip.to_string(),
                        uuid: uuid.to_string(),
                    })?;
                    let mut player =
                        Player::new(uuid, &name, org_name, ip, protocol.map(str::to_string));
                    player.last_seen = now;
                    (player, LoginOutcome::Created)
                }
            };

            if !self.owner_uuid.is_empty() && uuid == self.owner_uuid {
                player.access_level = roles::OWNER;
            }
            tx.put_player(&player)?;
            Ok((player.name, outcome))
        });

        let (resolved, outcome) = match result {
            Ok(done) => done,
            Err(err) => {
                if matches!(err, StoreError::Banned(_) | StoreError::AlreadyLoggedIn(_)) {
                    warn!(target: "security", "Login refused for {} ({}): {}", uuid, ip, err);
                }
                return Err(err);
            }
        };
        match outcome {
            LoginOutcome::Created => {
                info!("Adding new player with name: {}", escape_log(&resolved));
            }
            LoginOutcome::Returning {
                renamed_from: Some(old),
            } => {
                info!(
                    "Detected username change: {} -> {}",
                    escape_log(&old),
                    escape_log(&resolved)
                );
            }
            LoginOutcome::Returning { renamed_from: None } => {
                debug!("Returning player {}", escape_log(&resolved));
            }
        }
        if resolved != name {
            info!(
                "Got a duplicate nickname, '{}' became '{}'",
                escape_log(name),
                escape_log(&resolved)
            );
        }
        if !self.owner_uuid.is_empty() && uuid == self.owner_uuid {
            info!(target: "security", "Owner uuid {} logged in, access level forced to OWNER", uuid);
        }
        Ok(self.handle(uuid))
    }

    /// Duplicate-name loop: append `_` while `name` belongs to a different account.
    fn resolve_name(&self, tx: &Tx<'_>, name: &str, org_name: &str) -> TxResult<String> {
        let account = tx.first_by_org(org_name)?;
        let mut candidate = name.to_string();
        let mut attempts = 0u32;
        while let Some(holder) = tx.first_by_name(&candidate)? {
            if account.as_ref().is_some_and(|a| a.uuid == holder.uuid) {
                break;
            }
            if attempts >= self.name_retry_limit {
                return Err(abort(StoreError::NameExhausted {
                    name: name.to_string(),
                    attempts,
                }));
            }
            attempts += 1;
            candidate.push('_');
        }
        Ok(candidate)
    }

    /// Every player currently marked logged in.
    pub fn who(&self) -> Result<Vec<PlayerHandle>, StoreError> {
        let players = self
            .tables
            .scan_players()?
            .into_iter()
            .filter(|p| p.logged_in)
            .collect();
        Ok(self.handles(players))
    }

    pub fn all(&self) -> Result<Vec<PlayerHandle>, StoreError> {
        let players = self.tables.scan_players()?;
        Ok(self.handles(players))
    }

    /// Players whose name matches a `LIKE` pattern (`%` and `_` wildcards).
    pub fn all_like(&self, pattern: &str) -> Result<Vec<PlayerHandle>, StoreError> {
        let players = self
            .tables
            .scan_players()?
            .into_iter()
            .filter(|p| pattern::like_match(pattern, &p.name, self.like_case_sensitive))
            .collect();
        Ok(self.handles(players))
    }

    /// Plain copy of the first player with this name, ignoring case.
    pub fn whois(&self, name: &str) -> Result<Option<Player>, StoreError> {
        self.tables.transaction(|tx| tx.first_by_name(name))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<PlayerHandle>, StoreError> {
        let found = self.tables.transaction(|tx| tx.first_by_name(name))?;
        Ok(found.map(|p| self.handle(p.uuid)))
    }

    pub fn get_by_org_name(&self, org_name: &str) -> Result<Option<PlayerHandle>, StoreError> {
        let found = self.tables.transaction(|tx| tx.first_by_org(org_name))?;
        Ok(found.map(|p| self.handle(p.uuid)))
    }

    /// Lookup by uuid, ignoring ASCII case.
    pub fn get_by_uuid(&self, uuid: &str) -> Result<Option<PlayerHandle>, StoreError> {
        if let Some(player) = self.tables.transaction(|tx| tx.player(uuid))? {
            return Ok(Some(self.handle(player.uuid)));
        }
        let found = self
            .tables
            .scan_players()?
            .into_iter()
            .find(|p| p.uuid.eq_ignore_ascii_case(uuid));
        Ok(found.map(|p| self.handle(p.uuid)))
    }

    pub fn get_logged_in_by_name(&self, name: &str) -> Result<Option<PlayerHandle>, StoreError> {
        let found = self
            .tables
            .transaction(|tx| tx.first_logged_in_by_name(name))?;
        Ok(found.map(|p| self.handle(p.uuid)))
    }

    /// Ban an IP address or org name. Banning an already banned key keeps the
    /// existing row and its reason.
    ///
    /// The key is stored exactly as given so login checks match it byte for byte.
    pub fn ban(&self, key: &str, reason: Option<&str>) -> Result<BanHandle, StoreError> {
        if key.trim().is_empty() {
            return Err(StoreError::InvalidInput("ban key cannot be empty".into()));
        }
        let id = self.tables.next_id()?;
        let created = self.tables.transaction(|tx| {
            if tx.ban(key)?.is_some() {
                return Ok(false);
            }
            tx.put_ban(&Ban {
                id,
                key: key.to_string(),
                reason: reason.map(str::to_string),
            })?;
            Ok(true)
        })?;
        if created {
            info!(target: "security", "Banned {}", escape_log(key));
        } else {
            debug!("{} is already banned", escape_log(key));
        }
        Ok(BanHandle::new(self.tables.clone(), key))
    }

    /// Lift a ban. Returns false (and does nothing) when `key` was not banned.
    pub fn unban(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.tables.transaction(|tx| tx.remove_ban(key))?;
        if removed {
            info!(target: "security", "Unbanned {}", escape_log(key));
        }
        Ok(removed)
    }

    pub fn check_bans(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.tables.transaction(|tx| tx.ban(key))?.is_some())
    }

    /// Every ban row, oldest first.
    pub fn list_bans(&self) -> Result<Vec<Ban>, StoreError> {
        self.tables.scan_bans()
    }

    /// Every ban row as a handle, oldest first.
    pub fn bans(&self) -> Result<Vec<BanHandle>, StoreError> {
        Ok(self
            .tables
            .scan_bans()?
            .into_iter()
            .map(|b| BanHandle::new(self.tables.clone(), b.key))
            .collect())
    }

    /// Permanently remove a player and its IP history. Returns false if it was already gone.
    pub fn delete(&self, player: &PlayerHandle) -> Result<bool, StoreError> {
        let uuid = player.uuid();
        let ips = self.tables.scan_ips(uuid)?;
        let removed = self.tables.transaction(|tx| {
            let removed = tx.remove_player(uuid)?;
            for row in &ips {
                tx.remove_ip(row)?;
            }
            Ok(removed)
        })?;
        match removed {
            Some(p) => {
                info!(target: "security", "Deleted player {} ({})", escape_log(&p.name), uuid);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the ban behind `ban`. Returns false if it was already gone.
    pub fn delete_ban(&self, ban: &BanHandle) -> Result<bool, StoreError> {
        self.unban(ban.key())
    }

    /// Hand out a storage capability bound to one feature's name.
    pub fn register_extension(&self, name: &str) -> Result<Extension, StoreError> {
        let extension = Extension::new(name)?;
        debug!("Registered storage extension '{}'", extension.name());
        Ok(extension)
    }

    pub fn owner_uuid(&self) -> &str {
        &self.owner_uuid
    }

    pub fn player_count(&self) -> usize {
        self.tables.player_count()
    }

    pub fn ban_count(&self) -> usize {
        self.tables.ban_count()
    }
}
