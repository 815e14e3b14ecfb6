//! Recorder and storage settings, loaded from an optional `config.toml`.
//!
//! A missing file means defaults. CLI flags are applied on top by the binary.

use crate::error::{KeytallyError, Result};
use crate::storage::StorageConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_IDLE_SECS: i64 = 15;
pub const DEFAULT_MIN_STORE_SECS: i64 = 120;
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 100_000;

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeytallyConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub storage: ShardStorageConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    /// Idle gap, in seconds, that splits one typing session into two.
    /// A gap of exactly this length does not split.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: i64,
    /// Minimum spacing, in seconds, between flushes to disk.
    #[serde(default = "default_min_store_secs")]
    pub min_store_secs: i64,
    /// Once the active shard is larger than this, the next flush rotates.
    #[serde(default = "default_max_shard_bytes")]
    pub max_shard_bytes: u64,
    /// Stop recording after this symbol is pressed.
    #[serde(default)]
    pub exit_on_symbol: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle_secs(),
            min_store_secs: default_min_store_secs(),
            max_shard_bytes: default_max_shard_bytes(),
            exit_on_symbol: None,
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_idle_secs < 0 {
            return Err(KeytallyError::ConfigInvalid(
                "max_idle_secs must not be negative".to_string(),
            ));
        }
        if self.min_store_secs < 0 {
            return Err(KeytallyError::ConfigInvalid(
                "min_store_secs must not be negative".to_string(),
            ));
        }
        if self.max_shard_bytes == 0 {
            return Err(KeytallyError::ConfigInvalid(
                "max_shard_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShardStorageConfig {
    #[serde(default)]
    pub shard_dir: Option<PathBuf>,
}

impl KeytallyConfig {
    /// The configured shard directory, or the storage default.
    pub fn shard_dir(&self, storage: &StorageConfig) -> PathBuf {
        self.storage
            .shard_dir
            .clone()
            .unwrap_or_else(|| storage.shard_dir())
    }
}

fn default_max_idle_secs() -> i64 {
    DEFAULT_MAX_IDLE_SECS
}

fn default_min_store_secs() -> i64 {
    DEFAULT_MIN_STORE_SECS
}

fn default_max_shard_bytes() -> u64 {
    DEFAULT_MAX_SHARD_BYTES
}

pub fn load_config(path: &Path) -> Result<KeytallyConfig> {
    if !path.exists() {
        return Ok(KeytallyConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| KeytallyError::Io {
        context: "Failed to read config".to_string(),
        source,
    })?;
    toml::from_str::<KeytallyConfig>(&content).map_err(|err| KeytallyError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
