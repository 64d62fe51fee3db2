//! # Configuration
//!
//! TOML configuration for the player store and the `playerdb` binary.
//!
//! ```toml
//! [storage]
//! player_db = "./data/players"
//! like_case_sensitive = false
//!
//! [server]
//! owner_uuid = "0123456789abcdef0123456789abcdef"
//! name_retry_limit = 64
//!
//! [logging]
//! level = "info"
//! file = "playerdb.log"
//! security_file = "playerdb-security.log"
//!
//! [colors]
//! guest = "^green;"
//! owner = "^#F7434C;"
//! default = "^reset;"
//! ```
//!
//! `[colors]` maps lowercase rank names to chat colour tags and is only used when
//! rendering names (see [`crate::storage::Player::colored_name`]).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default = "default_colors")]
    pub colors: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database.
    pub player_db: String,
    /// Whether `all_like` patterns distinguish upper and lower case.
    #[serde(default)]
    pub like_case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// uuid that is always granted OWNER on login. Empty disables the override.
    #[serde(default)]
    pub owner_uuid: String,
    /// Upper bound on underscores appended while resolving a duplicate display name.
    #[serde(default = "default_name_retry_limit")]
    pub name_retry_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

fn default_name_retry_limit() -> u32 {
    64
}

fn default_colors() -> HashMap<String, String> {
    [
        ("guest", "^yellow;"),
        ("registered", "^green;"),
        ("moderator", "^magenta;"),
        ("admin", "^cyan;"),
        ("owner", "^red;"),
        ("default", "^reset;"),
    ]
    .into_iter()
    .map(|(rank, color)| (rank.to_string(), color.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Default configuration with the database placed under `dir`; handy for tests.
    pub fn with_player_db(dir: impl AsRef<std::path::Path>) -> Self {
        let mut config = Config::default();
        config.storage.player_db = dir.as_ref().to_string_lossy().into_owned();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                player_db: "./data/players".to_string(),
                like_case_sensitive: false,
            },
            server: ServerConfig {
                owner_uuid: String::new(),
                name_retry_limit: default_name_retry_limit(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("playerdb.log".to_string()),
                security_file: Some("playerdb-security.log".to_string()),
            },
            colors: default_colors(),
        }
    }
}
