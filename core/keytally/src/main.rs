//! keytally: keystroke usage recorder and analyzer.
//!
//! ## Subcommands
//!
//! - `record`: Reads key events from stdin and appends them to shard files
//! - `analyze`: Replays every shard and prints a keycount, burst or hourly report
//! - `shards`: Lists shard files in replay order

mod analyze;
mod logging;
mod record;
mod shards;

use clap::{Parser, Subcommand};
use keytally_core::{load_config, KeytallyConfig, KeytallyError, StorageConfig};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] KeytallyError),

    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "keytally")]
#[command(about = "Keystroke usage recorder and analyzer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record key events read from stdin (one symbol, or `press`/`release` SYMBOL, per line)
    Record(record::RecordArgs),

    /// Replay all shards and print a report
    Analyze {
        /// Which report to print
        #[arg(value_enum, value_name = "REPORT")]
        report: analyze::ReportView,

        /// Shard directory to read (default: from config, then ~/.keytally/shards)
        #[arg(long, value_name = "DIR")]
        shard_dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List shard files in replay order
    Shards {
        /// Shard directory to list
        #[arg(long, value_name = "DIR")]
        shard_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let storage = StorageConfig::from_env();

    let log_dir = match (&cli.command, &storage) {
        (Commands::Record(_), Ok(storage)) => Some(storage.log_dir()),
        _ => None,
    };
    let _logging_guard = logging::init(log_dir.as_deref());

    let result = match cli.command {
        Commands::Record(args) => load_settings(storage)
            .and_then(|(storage, config)| record::run(args, config, &storage)),
        Commands::Analyze {
            report,
            shard_dir,
            json,
        } => resolve_shard_dir(shard_dir, storage)
            .and_then(|shard_dir| analyze::run(report, shard_dir, json)),
        Commands::Shards { shard_dir } => {
            resolve_shard_dir(shard_dir, storage).and_then(shards::run)
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "keytally failed");
        std::process::exit(1);
    }
}

fn load_settings(
    storage: keytally_core::Result<StorageConfig>,
) -> Result<(StorageConfig, KeytallyConfig), CliError> {
    let storage = storage?;
    let config = load_config(&storage.config_file())?;
    Ok((storage, config))
}

/// An explicit `--shard-dir` needs neither the data directory nor the config.
fn resolve_shard_dir(
    flag: Option<PathBuf>,
    storage: keytally_core::Result<StorageConfig>,
) -> Result<PathBuf, CliError> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    let (storage, config) = load_settings(storage)?;
    Ok(config.shard_dir(&storage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_shard_dir_skips_data_directory() {
        let dir = resolve_shard_dir(
            Some(PathBuf::from("/tmp/shards")),
            Err(KeytallyError::HomeDirNotFound),
        )
        .expect("explicit dir");
        assert_eq!(dir, PathBuf::from("/tmp/shards"));
    }

    #[test]
    fn default_shard_dir_needs_data_directory() {
        let result = resolve_shard_dir(None, Err(KeytallyError::HomeDirNotFound));
        assert!(matches!(
            result,
            Err(CliError::Core(KeytallyError::HomeDirNotFound))
        ));
    }

    #[test]
    fn default_shard_dir_comes_from_data_directory() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp_dir.path().to_path_buf());

        let dir = resolve_shard_dir(None, Ok(storage)).expect("default dir");
        assert_eq!(dir, temp_dir.path().join("shards"));
    }
}
