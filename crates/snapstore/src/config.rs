//! Client configuration
//!
//! Loaded from TOML (every field optional) and overridable from the environment.
//!
//! ```toml
//! path = "/var/lib/backoffice/store.db"
//! collections = ["publications", "datasets"]
//! pool_size = 16
//! busy_timeout_ms = 5000
//! journal_mode = "wal"
//! cursor_batch_size = 256
//! ```

use crate::errors::{io_error, ErrorKind, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "SNAPSTORE_DB";
pub const ENV_POOL_SIZE: &str = "SNAPSTORE_POOL_SIZE";

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead logging: readers do not block the single writer.
    #[default]
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal, no crash recovery.
    Memory,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Collections to provision on open
    pub collections: Vec<String>,
    /// Maximum pooled connections
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    /// Rows fetched per cursor page
    pub cursor_batch_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("snapstore.db"),
            collections: Vec::new(),
            pool_size: 8,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            cursor_batch_size: 256,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointing at `path`
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| {
            StoreError::new(ErrorKind::Config)
                .with_op("config_parse")
                .with_message(e.to_string())
                .with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| io_error("config_read", e))?;
        Self::from_toml_str(&raw)
    }

    /// Apply `SNAPSTORE_DB` / `SNAPSTORE_POOL_SIZE` overrides
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB) {
            self.path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            self.pool_size = raw.trim().parse().map_err(|_| {
                StoreError::new(ErrorKind::Config)
                    .with_op("config_env")
                    .with_message(format!("{} must be a positive integer, got '{}'", ENV_POOL_SIZE, raw))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StoreError::new(ErrorKind::Config)
                .with_op("config_validate")
                .with_message("pool_size must be at least 1"));
        }
        if self.cursor_batch_size == 0 {
            return Err(StoreError::new(ErrorKind::Config)
                .with_op("config_validate")
                .with_message("cursor_batch_size must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = ClientConfig::from_toml_str(
            r#"
            path = "/tmp/store.db"
            collections = ["publications", "datasets"]
            pool_size = 4
            busy_timeout_ms = 250
            journal_mode = "delete"
            cursor_batch_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.collections, vec!["publications", "datasets"]);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.cursor_batch_size, 10);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ClientConfig::from_toml_str("pool = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_zero_pool_rejected() {
        let err = ClientConfig::from_toml_str("pool_size = 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::default()
            .apply_overrides(|key| match key {
                ENV_DB => Some("/data/override.db".to_string()),
                ENV_POOL_SIZE => Some("3".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.path, PathBuf::from("/data/override.db"));
        assert_eq!(config.pool_size, 3);
    }

    #[test]
    fn test_env_override_bad_pool_size() {
        let err = ClientConfig::default()
            .apply_overrides(|key| (key == ENV_POOL_SIZE).then(|| "many".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
