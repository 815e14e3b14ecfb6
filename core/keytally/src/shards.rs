//! `keytally shards`: list shard files in the order they are replayed.

use crate::CliError;
use keytally_core::{ShardFile, ShardStore};
use std::io::{self, Write};
use std::path::PathBuf;

pub fn run(shard_dir: PathBuf) -> Result<(), CliError> {
    let shards = ShardStore::new(shard_dir).list_shards()?;

    let mut stdout = io::stdout().lock();
    for shard in &shards {
        writeln!(stdout, "{}", describe(shard)?)?;
    }
    stdout.flush()?;
    Ok(())
}

/// `path;created_at;bytes`
fn describe(shard: &ShardFile) -> io::Result<String> {
    let size = fs_err::metadata(&shard.path)?.len();
    Ok(format!(
        "{};{};{}",
        shard.path.display(),
        shard.created_at,
        size
    ))
}
