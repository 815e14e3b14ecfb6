//! `keytally record`: drive the recorder from stdin until EOF or Ctrl-C.
//!
//! ```bash
//! my-key-hook | keytally record --exit-on Escape
//! ```

use crate::CliError;
use clap::Args;
use keytally_core::source::spawn_line_reader;
use keytally_core::{ChannelSource, KeytallyConfig, Recorder, ShardStore, StorageConfig, SystemClock};
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub struct RecordArgs {
    /// Shard directory to write (default: from config, then ~/.keytally/shards)
    #[arg(long, value_name = "DIR")]
    shard_dir: Option<PathBuf>,

    /// Idle gap in seconds that ends a typing session
    #[arg(long, value_name = "SECS")]
    max_idle: Option<i64>,

    /// Minimum seconds between flushes to disk
    #[arg(long, value_name = "SECS")]
    min_store: Option<i64>,

    /// Rotate to a new shard once the current one is larger than this
    #[arg(long, value_name = "BYTES")]
    max_shard_bytes: Option<u64>,

    /// Stop recording after this symbol is pressed
    #[arg(long, value_name = "SYMBOL")]
    exit_on: Option<String>,
}

impl RecordArgs {
    /// CLI flags win over config file values.
    fn apply(self, config: &mut KeytallyConfig) {
        if let Some(dir) = self.shard_dir {
            config.storage.shard_dir = Some(dir);
        }
        if let Some(secs) = self.max_idle {
            config.recorder.max_idle_secs = secs;
        }
        if let Some(secs) = self.min_store {
            config.recorder.min_store_secs = secs;
        }
        if let Some(bytes) = self.max_shard_bytes {
            config.recorder.max_shard_bytes = bytes;
        }
        if let Some(symbol) = self.exit_on {
            config.recorder.exit_on_symbol = Some(symbol);
        }
    }
}

pub fn run(
    args: RecordArgs,
    mut config: KeytallyConfig,
    storage: &StorageConfig,
) -> Result<(), CliError> {
    args.apply(&mut config);
    let store = ShardStore::new(config.shard_dir(storage));
    let recorder = Recorder::open(config.recorder, store, SystemClock)?;

    let (mut source, sender) = ChannelSource::new();
    let signal_sender = sender.clone();
    ctrlc::set_handler(move || {
        signal_sender.shutdown();
    })?;

    // Detached: it blocks on stdin and dies with the process.
    spawn_line_reader(BufReader::new(io::stdin()), sender);

    tracing::info!("Reading key events from stdin");
    keytally_core::recorder::run(recorder, &mut source)?;
    Ok(())
}
