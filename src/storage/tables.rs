//! Tree layout and the transaction scope every store operation runs in.
//!
//! sled transactions cannot iterate, so name and org-name lookups go through two
//! small index trees (`names`, `orgs`) mapping a lowercased name to the uuids that
//! currently carry it, oldest player first. The indexes persist across restarts so
//! that order survives. Roster-wide scans run outside a transaction.

use std::cell::Cell;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Transactional, Tree};

use crate::storage::errors::StoreError;
use crate::storage::models::{Ban, IpAddress, Player};

const TREE_PLAYERS: &str = "players";
const TREE_IPS: &str = "ips";
const TREE_BANS: &str = "bans";
const TREE_NAMES: &str = "players_by_name";
const TREE_ORGS: &str = "players_by_org";

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

/// Wrap a store error so returning it from a transaction closure rolls the transaction back.
pub(crate) fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

pub(crate) fn players_tree(db: &sled::Db) -> Result<Tree, StoreError> {
    Ok(db.open_tree(TREE_PLAYERS)?)
}

fn index_key(name: &str) -> Vec<u8> {
    name.to_lowercase().into_bytes()
}

fn ip_prefix(uuid: &str) -> Vec<u8> {
    let mut key = uuid.as_bytes().to_vec();
    key.push(0);
    key
}

fn ip_key(uuid: &str, ip: &str) -> Vec<u8> {
    let mut key = ip_prefix(uuid);
    key.extend_from_slice(ip.as_bytes());
    key
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    serde_json::from_slice(bytes).map_err(|e| abort(StoreError::Json(e)))
}

fn encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| abort(StoreError::Json(e)))
}

/// Handles to every tree the store uses. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Tables {
    db: sled::Db,
    players: Tree,
    ips: Tree,
    bans: Tree,
    names: Tree,
    orgs: Tree,
}

impl Tables {
    pub(crate) fn open(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            players: db.open_tree(TREE_PLAYERS)?,
            ips: db.open_tree(TREE_IPS)?,
            bans: db.open_tree(TREE_BANS)?,
            names: db.open_tree(TREE_NAMES)?,
            orgs: db.open_tree(TREE_ORGS)?,
            db,
        })
    }

    /// Run `f` inside one transaction spanning all trees.
    ///
    /// An `Err` from `f` discards every write made inside it and is handed back to the
    /// caller unchanged. sled may re-run `f` on conflict. The database is flushed after a
    /// transaction that wrote anything.
    pub(crate) fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&Tx<'_>) -> TxResult<T>,
    {
        let trees = (&self.players, &self.ips, &self.bans, &self.names, &self.orgs);
        let result: Result<(T, bool), TransactionError<StoreError>> =
            trees.transaction(|(players, ips, bans, names, orgs)| {
                let tx = Tx {
                    players,
                    ips,
                    bans,
                    names,
                    orgs,
                    dirty: Cell::new(false),
                };
                let value = f(&tx)?;
                Ok((value, tx.dirty.get()))
            });
        match result {
            Ok((value, dirty)) => {
                if dirty {
                    self.db.flush()?;
                }
                Ok(value)
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(StoreError::Sled(err)),
        }
    }

    /// Next value of the store-wide id sequence used for IP and ban rows.
    pub(crate) fn next_id(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub(crate) fn scan_players(&self) -> Result<Vec<Player>, StoreError> {
        let mut players = Vec::new();
        for entry in self.players.iter() {
            let (_, bytes) = entry?;
            players.push(serde_json::from_slice(&bytes)?);
        }
        Ok(players)
    }

    /// Every ban, oldest first.
    pub(crate) fn scan_bans(&self) -> Result<Vec<Ban>, StoreError> {
        let mut bans: Vec<Ban> = Vec::new();
        for entry in self.bans.iter() {
            let (_, bytes) = entry?;
            bans.push(serde_json::from_slice(&bytes)?);
        }
        bans.sort_by_key(|b| b.id);
        Ok(bans)
    }

    /// IP rows recorded for one player, oldest first.
    pub(crate) fn scan_ips(&self, uuid: &str) -> Result<Vec<IpAddress>, StoreError> {
        let mut ips: Vec<IpAddress> = Vec::new();
        for entry in self.ips.scan_prefix(ip_prefix(uuid)) {
            let (_, bytes) = entry?;
            ips.push(serde_json::from_slice(&bytes)?);
        }
        ips.sort_by_key(|ip| ip.id);
        Ok(ips)
    }

    pub(crate) fn player_count(&self) -> usize {
        self.players.len()
    }

    pub(crate) fn ban_count(&self) -> usize {
        self.bans.len()
    }

    /// Bring both name indexes in line with the player tree.
    ///
    /// Entries already present keep their order, which is the order players were
    /// created in. Stale uuids are dropped and players missing from an index (rows
    /// written by older releases) are appended. Returns the number of players.
    ///
    /// Not transactional; only called during startup before any handle exists.
    pub(crate) fn reconcile_indexes(&self) -> Result<usize, StoreError> {
        let players = self.scan_players()?;
        let by_uuid: HashMap<&str, &Player> =
            players.iter().map(|p| (p.uuid.as_str(), p)).collect();
        reconcile_index(&self.names, &players, &by_uuid, |p| p.name.as_str())?;
        reconcile_index(&self.orgs, &players, &by_uuid, |p| p.org_name.as_str())?;
        self.db.flush()?;
        Ok(players.len())
    }
}

fn reconcile_index(
    tree: &Tree,
    players: &[Player],
    by_uuid: &HashMap<&str, &Player>,
    indexed_name: fn(&Player) -> &str,
) -> Result<(), StoreError> {
    for entry in tree.iter() {
        let (key, bytes) = entry?;
        let uuids: Vec<String> = serde_json::from_slice(&bytes)?;
        let kept: Vec<String> = uuids
            .iter()
            .filter(|uuid| {
                by_uuid
                    .get(uuid.as_str())
                    .is_some_and(|p| index_key(indexed_name(p)) == &key[..])
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            tree.remove(&key)?;
        } else if kept.len() != uuids.len() {
            tree.insert(&key, serde_json::to_vec(&kept)?)?;
        }
    }
    for player in players {
        append_index(tree, indexed_name(player), &player.uuid)?;
    }
    Ok(())
}

fn append_index(tree: &Tree, name: &str, uuid: &str) -> Result<(), StoreError> {
    let key = index_key(name);
    let mut uuids: Vec<String> = match tree.get(&key)? {
        Some(bytes) => serde_json::from_slice(&bytes)?,
        None => Vec::new(),
    };
    if uuids.iter().any(|u| u == uuid) {
        return Ok(());
    }
    uuids.push(uuid.to_string());
    tree.insert(key, serde_json::to_vec(&uuids)?)?;
    Ok(())
}

/// Transactional view over all trees, handed to closures run by [`Tables::transaction`].
pub(crate) struct Tx<'a> {
    players: &'a TransactionalTree,
    ips: &'a TransactionalTree,
    bans: &'a TransactionalTree,
    names: &'a TransactionalTree,
    orgs: &'a TransactionalTree,
    dirty: Cell<bool>,
}

impl Tx<'_> {
    pub(crate) fn player(&self, uuid: &str) -> TxResult<Option<Player>> {
        match self.players.get(uuid.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Tx::player`] but a missing record aborts with `NotFound`.
    pub(crate) fn require_player(&self, uuid: &str) -> TxResult<Player> {
        self.player(uuid)?
            .ok_or_else(|| abort(StoreError::NotFound(format!("player: {}", uuid))))
    }

    /// Insert or update a player, keeping the name indexes in step.
    pub(crate) fn put_player(&self, player: &Player) -> TxResult<()> {
        let previous = self.player(&player.uuid)?;
        let (old_name, old_org) = match &previous {
            Some(p) => (Some(p.name.as_str()), Some(p.org_name.as_str())),
            None => (None, None),
        };
        self.reindex(self.names, old_name, Some(player.name.as_str()), &player.uuid)?;
        self.reindex(self.orgs, old_org, Some(player.org_name.as_str()), &player.uuid)?;
        self.players.insert(player.uuid.as_bytes(), encode(player)?)?;
        self.dirty.set(true);
        Ok(())
    }

    pub(crate) fn remove_player(&self, uuid: &str) -> TxResult<Option<Player>> {
        let Some(player) = self.player(uuid)? else {
            return Ok(None);
        };
        self.reindex(self.names, Some(player.name.as_str()), None, uuid)?;
        self.reindex(self.orgs, Some(player.org_name.as_str()), None, uuid)?;
        self.players.remove(uuid.as_bytes())?;
        self.dirty.set(true);
        Ok(Some(player))
    }

    /// First player (in creation order) whose display name matches, ignoring case.
    pub(crate) fn first_by_name(&self, name: &str) -> TxResult<Option<Player>> {
        self.first_indexed(self.names, name, |_| true)
    }

    pub(crate) fn first_by_org(&self, org_name: &str) -> TxResult<Option<Player>> {
        self.first_indexed(self.orgs, org_name, |_| true)
    }

    pub(crate) fn first_logged_in_by_name(&self, name: &str) -> TxResult<Option<Player>> {
        self.first_indexed(self.names, name, |p| p.logged_in)
    }

    pub(crate) fn ban(&self, key: &str) -> TxResult<Option<Ban>> {
        match self.bans.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn put_ban(&self, ban: &Ban) -> TxResult<()> {
        self.bans.insert(ban.key.as_bytes(), encode(ban)?)?;
        self.dirty.set(true);
        Ok(())
    }

    pub(crate) fn remove_ban(&self, key: &str) -> TxResult<bool> {
        let removed = self.bans.remove(key.as_bytes())?.is_some();
        if removed {
            self.dirty.set(true);
        }
        Ok(removed)
    }

    pub(crate) fn has_ip(&self, uuid: &str, ip: &str) -> TxResult<bool> {
        Ok(self.ips.get(ip_key(uuid, ip))?.is_some())
    }

    pub(crate) fn put_ip(&self, row: &IpAddress) -> TxResult<()> {
        self.ips.insert(ip_key(&row.uuid, &row.ip), encode(row)?)?;
        self.dirty.set(true);
        Ok(())
    }

    pub(crate) fn remove_ip(&self, row: &IpAddress) -> TxResult<()> {
        self.ips.remove(ip_key(&row.uuid, &row.ip))?;
        self.dirty.set(true);
        Ok(())
    }

    fn first_indexed<P>(&self, tree: &TransactionalTree, name: &str, accept: P) -> TxResult<Option<Player>>
    where
        P: Fn(&Player) -> bool,
    {
        for uuid in self.index_get(tree, name)? {
            if let Some(player) = self.player(&uuid)? {
                if accept(&player) {
                    return Ok(Some(player));
                }
            }
        }
        Ok(None)
    }

    fn index_get(&self, tree: &TransactionalTree, name: &str) -> TxResult<Vec<String>> {
        match tree.get(index_key(name))? {
            Some(bytes) => decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn reindex(
        &self,
        tree: &TransactionalTree,
        old: Option<&str>,
        new: Option<&str>,
        uuid: &str,
    ) -> TxResult<()> {
        let old_key = old.map(index_key);
        let new_key = new.map(index_key);
        if old_key == new_key {
            return Ok(());
        }
        if let Some(key) = old_key {
            let mut uuids: Vec<String> = match tree.get(&key)? {
                Some(bytes) => decode(&bytes)?,
                None => Vec::new(),
            };
            uuids.retain(|u| u != uuid);
            if uuids.is_empty() {
                tree.remove(key)?;
            } else {
                tree.insert(key, encode(&uuids)?)?;
            }
        }
        if let Some(key) = new_key {
            let mut uuids: Vec<String> = match tree.get(&key)? {
                Some(bytes) => decode(&bytes)?,
                None => Vec::new(),
            };
            if !uuids.iter().any(|u| u == uuid) {
                uuids.push(uuid.to_string());
            }
            tree.insert(key, encode(&uuids)?)?;
        }
        Ok(())
    }
}
