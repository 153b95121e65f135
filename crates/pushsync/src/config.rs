//! Service configuration
//!
//! Loaded from (in order of priority):
//! 1. An explicit JSON file
//! 2. `gmailpush.json` in the gmailpush config directory
//! 3. Built-in defaults
//!
//! Environment variables then override individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::storage::{CursorStore, InMemoryCursorStore, JsonFileCursorStore, SqliteCursorStore};
use crate::sync::CursorCommit;

/// Config filename in the gmailpush config directory
const CONFIG_FILE: &str = "gmailpush.json";

/// Where cursors are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CursorStoreConfig {
    JsonFile { path: PathBuf },
    Sqlite { path: PathBuf },
    Memory,
}

impl Default for CursorStoreConfig {
    fn default() -> Self {
        Self::JsonFile {
            path: PathBuf::from(JsonFileCursorStore::DEFAULT_FILE),
        }
    }
}

/// Settings for a push sync service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Pub/Sub topic the mailbox watch publishes to
    pub pub_sub_topic: Option<String>,
    pub cursor_store: CursorStoreConfig,
    pub commit: CursorCommit,
    pub max_parallel_fetches: Option<usize>,
    /// Global timeout for each Gmail API request
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pub_sub_topic: None,
            cursor_store: CursorStoreConfig::default(),
            commit: CursorCommit::default(),
            max_parallel_fetches: None,
            request_timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load from the config directory, then apply environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path` if given, else the config directory, then apply
    /// environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => config::load_json_file(path)?,
            None if config::config_exists(CONFIG_FILE) => config::load_json(CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GMAILPUSH_*` variables looked up through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("GMAILPUSH_CURSOR_PATH") {
            self.cursor_store = match &self.cursor_store {
                CursorStoreConfig::Sqlite { .. } => CursorStoreConfig::Sqlite { path: path.into() },
                _ => CursorStoreConfig::JsonFile { path: path.into() },
            };
        }

        if let Some(commit) = lookup("GMAILPUSH_COMMIT") {
            self.commit = serde_json::from_value(serde_json::Value::String(commit.clone()))
                .map_err(|_| ConfigError::Invalid(format!("unknown commit policy '{}'", commit)))?;
        }

        if let Some(max) = lookup("GMAILPUSH_MAX_PARALLEL") {
            let max = max
                .trim()
                .parse::<usize>()
                .with_context(|| format!("GMAILPUSH_MAX_PARALLEL is not a number: {}", max))?;
            self.max_parallel_fetches = Some(max);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_fetches == Some(0) {
            return Err(ConfigError::Invalid(
                "maxParallelFetches must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "requestTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the configured cursor store
    pub fn open_store(&self) -> Result<Arc<dyn CursorStore>> {
        let store: Arc<dyn CursorStore> = match &self.cursor_store {
            CursorStoreConfig::JsonFile { path } => Arc::new(JsonFileCursorStore::new(path)),
            CursorStoreConfig::Sqlite { path } => Arc::new(SqliteCursorStore::new(path)?),
            CursorStoreConfig::Memory => Arc::new(InMemoryCursorStore::new()),
        };
        Ok(store)
    }
}
