//! Storage path management for keytally.
//!
//! `StorageConfig` is the single place that decides where keytally keeps its
//! data. Production code resolves it from the environment; tests build one
//! with [`StorageConfig::with_root`] pointing at a temp directory.
//!
//! ```text
//! ~/.keytally/
//!   config.toml      # optional recorder/storage settings
//!   shards/          # one <epoch>.log file per shard
//!   logs/            # rolling recorder logs
//! ```

use crate::error::{KeytallyError, Result};
use std::path::{Path, PathBuf};

/// Overrides the data root when set.
pub const HOME_ENV_VAR: &str = "KEYTALLY_HOME";

const DEFAULT_ROOT_DIR: &str = ".keytally";

/// Central configuration for all keytally storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all keytally data (default: ~/.keytally)
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the data root from `$KEYTALLY_HOME`, falling back to `~/.keytally`.
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = dirs::home_dir().ok_or(KeytallyError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(DEFAULT_ROOT_DIR)))
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default shard directory, used unless config or CLI names another one.
    pub fn shard_dir(&self) -> PathBuf {
        self.root.join("shards")
    }

    /// Path to config.toml (recorder and storage settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to logs/ directory (recorder log files).
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-keytally"));
        assert_eq!(config.root(), Path::new("/tmp/test-keytally"));
    }

    #[test]
    fn test_paths_hang_off_root() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/keytally"));
        assert_eq!(config.shard_dir(), PathBuf::from("/tmp/keytally/shards"));
        assert_eq!(
            config.config_file(),
            PathBuf::from("/tmp/keytally/config.toml")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/keytally/logs"));
    }
}
