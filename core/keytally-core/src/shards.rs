//! Shard directory management.
//!
//! A shard is one append-only `<epoch>.log` file. A second shard created in
//! the same second is named `<epoch>-<seq>.log`; existing files are never
//! truncated.
//!
//! Replay order comes from the epoch and sequence embedded in the name, not
//! from directory enumeration order, which the filesystem does not promise
//! to keep chronological.

use crate::error::{KeytallyError, Result};
use fs_err as fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SHARD_EXTENSION: &str = "log";

/// Upper bound on same-second collisions before giving up.
const MAX_SEQ: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    pub path: PathBuf,
    pub created_at: i64,
    pub seq: u32,
}

#[derive(Debug, Clone)]
pub struct ShardStore {
    dir: PathBuf,
}

impl ShardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the shard directory if it does not exist.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| KeytallyError::ShardDirUnavailable {
            path: self.dir.clone(),
            source,
        })
    }

    /// Creates a new, empty shard named after `now` and returns its path.
    pub fn create_shard(&self, now: i64) -> Result<PathBuf> {
        for seq in 0..MAX_SEQ {
            let path = self.dir.join(shard_file_name(now, seq));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(path),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(KeytallyError::ShardCreateFailed { path, source }),
            }
        }

        let path = self.dir.join(shard_file_name(now, MAX_SEQ));
        Err(KeytallyError::ShardCreateFailed {
            path,
            source: std::io::Error::new(ErrorKind::AlreadyExists, "too many shards this second"),
        })
    }

    /// Lists shards in replay order.
    ///
    /// A missing directory or one without any shard files is `NoData`.
    pub fn list_shards(&self) -> Result<Vec<ShardFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(KeytallyError::NoData(self.dir.clone()))
            }
            Err(source) => {
                return Err(KeytallyError::Io {
                    context: "Failed to list shard directory".to_string(),
                    source,
                })
            }
        };

        let mut shards = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match parse_shard_name(name) {
                Some((created_at, seq)) => shards.push(ShardFile {
                    path: path.clone(),
                    created_at,
                    seq,
                }),
                None => {
                    tracing::debug!(path = %path.display(), "Skipping non-shard file");
                }
            }
        }

        if shards.is_empty() {
            return Err(KeytallyError::NoData(self.dir.clone()));
        }

        shards.sort_by_key(|shard| (shard.created_at, shard.seq));
        Ok(shards)
    }
}

pub fn shard_file_name(created_at: i64, seq: u32) -> String {
    if seq == 0 {
        format!("{}.{}", created_at, SHARD_EXTENSION)
    } else {
        format!("{}-{}.{}", created_at, seq, SHARD_EXTENSION)
    }
}

/// Parses `<epoch>.log` or `<epoch>-<seq>.log` into `(epoch, seq)`.
pub fn parse_shard_name(name: &str) -> Option<(i64, u32)> {
    let stem = name.strip_suffix(SHARD_EXTENSION)?.strip_suffix('.')?;

    // A leading '-' belongs to a negative epoch, not to a sequence suffix.
    let (epoch, seq) = match stem.get(1..).and_then(|rest| rest.find('-')) {
        Some(idx) => (&stem[..idx + 1], Some(&stem[idx + 2..])),
        None => (stem, None),
    };

    let created_at = epoch.parse::<i64>().ok()?;
    let seq = match seq {
        Some(raw) => raw.parse::<u32>().ok().filter(|seq| *seq > 0)?,
        None => 0,
    };
    Some((created_at, seq))
}
