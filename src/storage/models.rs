//! Persisted record shapes for the `players`, `ips` and `bans` trees.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::roles;

/// Longest textual IP address accepted (an IPv6 address with an embedded IPv4 tail).
pub const MAX_IP_LEN: usize = 45;

/// Client id stored for players that have no live connection.
pub const NO_CLIENT_ID: i64 = -1;

/// Per-extension storage: extension name -> that extension's own key/value map.
pub type PluginStorage = BTreeMap<String, Map<String, Value>>;

/// One known player, keyed by the uuid the game client presents.
///
/// `org_name`, `title`, `muted` and `plugin_storage` carry no serde defaults: a stored
/// document lacking them fails to load until the startup migration has filled them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub uuid: String,
    pub name: String,
    pub org_name: String,
    pub last_seen: DateTime<Utc>,
    pub access_level: i32,
    pub logged_in: bool,
    /// Tag of the connection currently serving this player, if any.
    #[serde(default)]
    pub protocol: Option<String>,
    pub client_id: i64,
    pub ip: String,
    pub plugin_storage: PluginStorage,
    #[serde(default)]
    pub planet: String,
    #[serde(default)]
    pub on_ship: bool,
    pub muted: bool,
    pub title: String,
}

impl Player {
    /// A freshly created player as stored on first login.
    pub fn new(uuid: &str, name: &str, org_name: &str, ip: &str, protocol: Option<String>) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
            org_name: org_name.to_string(),
            last_seen: Utc::now(),
            access_level: roles::GUEST,
            logged_in: false,
            protocol,
            client_id: NO_CLIENT_ID,
            ip: ip.to_string(),
            plugin_storage: PluginStorage::new(),
            planet: String::new(),
            on_ship: true,
            muted: false,
            title: String::new(),
        }
    }

    /// Human readable rank for the current access level.
    pub fn rank(&self) -> &'static str {
        roles::rank_name(self.access_level)
    }

    /// Title, rank colour, name and a trailing reset tag, for chat rendering.
    ///
    /// `colors` is keyed by lowercase rank name plus `default`; missing entries render as
    /// nothing rather than failing.
    pub fn colored_name(&self, colors: &HashMap<String, String>) -> String {
        let color = colors
            .get(&self.rank().to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("");
        let reset = colors.get("default").map(String::as_str).unwrap_or("");
        format!("{}{}{}{}", self.title, color, self.name, reset)
    }

    /// Column name -> value view of the record.
    pub fn as_dict(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// An IP address observed for a player. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    pub ip: String,
    pub uuid: String,
}

/// A ban on either an IP address or an org name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub id: u64,
    #[serde(alias = "ip")]
    pub key: String,
    #[serde(default)]
    pub reason: Option<String>,
}
