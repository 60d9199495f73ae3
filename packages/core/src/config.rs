//! Configuration for the organization store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding [`StoreConfig::database_path`]
pub const DATABASE_PATH_ENV: &str = "ORGTREE_DATABASE_PATH";

/// Environment variable overriding [`StoreConfig::busy_timeout_ms`]
pub const BUSY_TIMEOUT_ENV: &str = "ORGTREE_BUSY_TIMEOUT_MS";

/// Upper bound for the busy timeout
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;

/// Configuration for the libsql-backed store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file (parent directories are created on open)
    pub database_path: PathBuf,

    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/orgtree.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Create a config for `database_path` with default settings
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Self::default()
        }
    }

    /// Build a config from the defaults, overridden by environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(path) = lookup(DATABASE_PATH_ENV) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(timeout) = lookup(BUSY_TIMEOUT_ENV) {
            config.busy_timeout_ms = timeout.trim().parse().map_err(|e| {
                format!("{} must be a number of milliseconds: {}", BUSY_TIMEOUT_ENV, e)
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path cannot be empty".to_string());
        }

        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(format!(
                "busy_timeout_ms cannot exceed {}",
                MAX_BUSY_TIMEOUT_MS
            ));
        }

        Ok(())
    }
}
