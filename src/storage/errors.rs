use thiserror::Error;

/// Errors that can arise while interacting with the player store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Login attempted for a uuid that is already marked logged in.
    #[error("player {0} is already logged in")]
    AlreadyLoggedIn(String),

    /// Login attempted from a banned IP address or a banned org name.
    #[error("banned: {0}")]
    Banned(String),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around JSON serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when a handle points at a record that has since been deleted.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Startup migration hit something other than a missing column.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The duplicate-name loop gave up after the configured number of attempts.
    #[error("could not find a free name for '{name}' after {attempts} attempts")]
    NameExhausted { name: String, attempts: u32 },

    /// Caller passed a value the store refuses to persist.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
