//! # keytally-core
//!
//! Records key presses into append-only shard files and replays those shards
//! into usage statistics.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One event is handled to completion
//!   before the next.
//! - **One-way data flow**: Recorder → shard files → Analyzer. The analyzer
//!   never writes.
//! - **Owned state**: The recorder is an explicit value handed to its event
//!   source, never a global.
//! - **Recoverable replay**: Bad lines and session protocol violations become
//!   warnings; only missing data and setup failures are errors.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keytally_core::{Analyzer, ShardStore};
//!
//! let replay = Analyzer::new(ShardStore::new("/home/me/.keytally/shards")).analyze()?;
//! print!("{}", replay.key_frequency().render());
//! ```

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod error;
pub mod recorder;
pub mod report;
pub mod shards;
pub mod source;
pub mod storage;

pub use analyzer::{Analyzer, Anomaly, Replay, ReplayState, ReplayWarning, WarningKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, KeytallyConfig, RecorderConfig};
pub use error::{KeytallyError, Result};
pub use keytally_format::LogRecord;
pub use recorder::{Recorder, RunSummary};
pub use report::{BurstEntry, BurstKind, BurstReport, Extremum, HourlyReport, KeyFrequencyReport};
pub use shards::{ShardFile, ShardStore};
pub use source::{ChannelSource, EventSender, KeyEventSource, SourceEvent};
pub use storage::StorageConfig;
