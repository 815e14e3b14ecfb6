//! Recorder: turns key presses into shard records.
//!
//! ## Session and flush policy
//!
//! ```text
//! key event ──► gap > max_idle_secs? ──yes──► buffer Stop{last event}, Start{now}
//!           └─► count[symbol] += 1
//!           └─► now - last_flush >= min_store_secs? ──yes──► flush
//!
//! flush ──► active shard > max_shard_bytes? ──yes──► rotate to <now>.log
//!       └─► append: Save{now}, buffered transitions, one Press per symbol
//! ```
//!
//! Every event is handled to completion, including any flush or rotation,
//! before the next one is accepted. Presses are at risk for at most
//! `min_store_secs`; [`Recorder::shutdown`] flushes unconditionally.

use crate::clock::{Clock, SystemClock};
use crate::config::RecorderConfig;
use crate::error::{KeytallyError, Result};
use crate::shards::ShardStore;
use crate::source::{KeyEventSource, SourceEvent};
use fs_err as fs;
use keytally_format::{is_representable_symbol, LogRecord};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub flushes: u64,
    pub rotations: u64,
    pub shard: PathBuf,
}

#[derive(Debug)]
struct ActiveShard {
    path: PathBuf,
    file: fs::File,
}

impl ActiveShard {
    fn open(path: PathBuf) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|source| KeytallyError::ShardCreateFailed {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, file })
    }

    fn size(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|source| KeytallyError::ShardWriteFailed {
                path: self.path.clone(),
                source,
            })
    }

    fn append(&mut self, block: &str) -> Result<()> {
        self.file
            .write_all(block.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|source| KeytallyError::ShardWriteFailed {
                path: self.path.clone(),
                source,
            })
    }
}

pub struct Recorder<C = SystemClock> {
    config: RecorderConfig,
    store: ShardStore,
    clock: C,
    active: ActiveShard,
    last_event_at: Option<i64>,
    last_flush_at: i64,
    pending_counts: BTreeMap<String, u64>,
    pending_transitions: Vec<LogRecord>,
    summary: RunSummary,
}

impl<C: Clock> Recorder<C> {
    /// Creates the shard directory if needed and starts a fresh shard.
    pub fn open(config: RecorderConfig, store: ShardStore, clock: C) -> Result<Self> {
        config.validate()?;
        store.ensure_dir()?;

        let now = clock.now();
        let active = ActiveShard::open(store.create_shard(now)?)?;
        info!(shard = %active.path.display(), "Recording to new shard");

        Ok(Self {
            config,
            store,
            clock,
            summary: RunSummary {
                shard: active.path.clone(),
                ..RunSummary::default()
            },
            active,
            last_event_at: None,
            last_flush_at: now,
            pending_counts: BTreeMap::new(),
            pending_transitions: Vec::new(),
        })
    }

    pub fn active_shard(&self) -> &Path {
        &self.active.path
    }

    /// Records one press of `symbol` and flushes if the store interval elapsed.
    pub fn on_key_event(&mut self, symbol: &str) -> Result<()> {
        if !is_representable_symbol(symbol) {
            warn!(symbol = ?symbol, "Dropping key symbol that cannot be stored");
            return Ok(());
        }

        let now = self.clock.now();
        let boundary = match self.last_event_at {
            None => true,
            Some(last) => now - last > self.config.max_idle_secs,
        };
        if boundary {
            if let Some(last) = self.last_event_at {
                self.pending_transitions
                    .push(LogRecord::SessionStop { at: last });
            }
            self.pending_transitions
                .push(LogRecord::SessionStart { at: now });
            debug!(at = now, "Typing session started");
        }

        *self.pending_counts.entry(symbol.to_string()).or_insert(0) += 1;
        self.last_event_at = Some(now);
        self.summary.events += 1;
        debug!(symbol, "Key press recorded");

        self.maybe_flush(now)
    }

    fn maybe_flush(&mut self, now: i64) -> Result<()> {
        if now - self.last_flush_at < self.config.min_store_secs {
            return Ok(());
        }
        self.flush_at(now)
    }

    fn flush_at(&mut self, now: i64) -> Result<()> {
        if self.active.size()? > self.config.max_shard_bytes {
            self.rotate(now)?;
        }

        let mut block = String::new();
        let mut records = 0usize;
        let checkpoint = LogRecord::Checkpoint { at: now };
        let presses = self
            .pending_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(symbol, count)| LogRecord::KeyPress {
                symbol: symbol.clone(),
                count: *count,
            });
        for record in std::iter::once(checkpoint)
            .chain(self.pending_transitions.iter().cloned())
            .chain(presses)
        {
            block.push_str(&record.encode());
            block.push('\n');
            records += 1;
        }

        self.active.append(&block)?;
        self.pending_transitions.clear();
        self.pending_counts.clear();
        self.last_flush_at = now;
        self.summary.flushes += 1;
        debug!(
            shard = %self.active.path.display(),
            records,
            "Flushed pending records"
        );
        Ok(())
    }

    fn rotate(&mut self, now: i64) -> Result<()> {
        let previous = self.active.path.clone();
        self.active = ActiveShard::open(self.store.create_shard(now)?)?;
        self.summary.rotations += 1;
        self.summary.shard = self.active.path.clone();
        info!(
            previous = %previous.display(),
            shard = %self.active.path.display(),
            "Rotated shard"
        );
        Ok(())
    }

    /// Final flush, regardless of `min_store_secs`.
    ///
    /// Closes the open typing session with a stop at the last event so that
    /// the next recorder run can begin with a start.
    pub fn shutdown(mut self) -> Result<RunSummary> {
        if let Some(last) = self.last_event_at.take() {
            self.pending_transitions
                .push(LogRecord::SessionStop { at: last });
        }

        if !self.pending_transitions.is_empty() || !self.pending_counts.is_empty() {
            let now = self.clock.now();
            self.flush_at(now)?;
        }

        info!(
            events = self.summary.events,
            flushes = self.summary.flushes,
            rotations = self.summary.rotations,
            shard = %self.summary.shard.display(),
            "Recorder stopped"
        );
        Ok(self.summary)
    }
}

/// Feeds `source` into `recorder` until shutdown, then drains it.
pub fn run<C, S>(mut recorder: Recorder<C>, source: &mut S) -> Result<RunSummary>
where
    C: Clock,
    S: KeyEventSource + ?Sized,
{
    while let Some(event) = source.next_event() {
        match event {
            SourceEvent::Press(symbol) => {
                recorder.on_key_event(&symbol)?;
                if recorder.config.exit_on_symbol.as_deref() == Some(symbol.as_str()) {
                    info!(symbol = %symbol, "Exit symbol pressed");
                    break;
                }
            }
            SourceEvent::Release(_) => {}
            SourceEvent::Shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    recorder.shutdown()
}
