//! # playerdb - Player Identity and Session Store
//!
//! playerdb is the identity and session store behind a multiplayer game server proxy.
//! It remembers every player that has connected, the IP addresses they came from and
//! the ban list, resolves display-name collisions at login and gates privileged
//! commands by access level.
//!
//! ## Features
//!
//! - **Login Resolution**: [`storage::PlayerStore::fetch_or_create`] refuses banned or
//!   already connected players, de-duplicates display names and records new IPs.
//! - **Read-Through Handles**: [`storage::PlayerHandle`] reloads its record on every
//!   access, so long-lived handles never serve stale data.
//! - **Bans**: keyed by IP address or org name.
//! - **Extension Storage**: per-feature key/value data on each player via
//!   [`storage::Extension`].
//! - **Access Levels**: GUEST, REGISTERED, MODERATOR, ADMIN, OWNER, enforced by
//!   [`access::Permission`].
//! - **Startup Migration**: older stores gain new columns automatically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use playerdb::access::{roles, Gated, Permission};
//! use playerdb::config::Config;
//! use playerdb::storage::PlayerStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let store = PlayerStore::new(&config)?;
//!
//!     let player = store.fetch_or_create("0123abcd", "Alice", "alice", "10.0.0.1", None)?;
//!     player.log_in(1)?;
//!
//!     let mut replies: Vec<String> = Vec::new();
//!     if let Gated::Allowed(()) = Permission::new(roles::ADMIN).run(&player, &mut replies, || ())? {
//!         store.ban("6.6.6.6", Some("griefing"))?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`storage`] - player, IP and ban persistence, handles and migration
//! - [`access`] - access tiers and the permission guard
//! - [`config`] - configuration loading
//! - [`logutil`] - log sanitizing helpers

pub mod access;
pub mod config;
pub mod logutil;
pub mod storage;
