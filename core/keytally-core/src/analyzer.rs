//! Replay analyzer.
//!
//! Reads every shard in name order and feeds all records through one
//! [`ReplayState`], so a typing session can start in one shard and stop in
//! the next. Reports are only meaningful after the whole stream has been
//! replayed; every analysis starts from scratch.
//!
//! ## Transitions
//!
//! ```text
//! Save{at}           -> hour bucket = floor(at / 3600) * 3600
//! Press{sym, n}      -> keys[sym] += n, hourly[bucket] += n
//! Start{at}, idle    -> emit Stop;last_stop;at-last_stop (after first stop), typing
//! Start{at}, typing  -> warning, ignored
//! Stop{at}, typing   -> emit Start;last_start;at-last_start, idle
//! Stop{at}, idle     -> warning, ignored
//! any, out of range  -> warning, ignored
//! ```
//!
//! Presses are attributed to the hour of the preceding checkpoint, not to the
//! moment they happened; shards only carry per-flush counts.

use crate::error::Result;
use crate::report::{
    BurstEntry, BurstKind, BurstReport, Extremum, HourlyReport, KeyFrequencyReport,
};
use crate::shards::ShardStore;
use fs_err as fs;
use keytally_format::LogRecord;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SECS_PER_HOUR: i64 = 3600;

/// Hour bucket (epoch seconds) containing `at`, or `None` when it falls
/// outside the `i64` range.
pub fn hour_bucket(at: i64) -> Option<i64> {
    at.div_euclid(SECS_PER_HOUR).checked_mul(SECS_PER_HOUR)
}

/// A record that was understood but does not fit the replay state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// Start while a session is already open.
    UnexpectedStart { at: i64 },
    /// Stop while no session is open.
    UnexpectedStop { at: i64 },
    /// Key press before any checkpoint; counted per key but not per hour.
    Unbucketed { symbol: String, count: u64 },
    /// Record whose value would overflow a counter or duration; ignored.
    Overflow { record: LogRecord },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::UnexpectedStart { at } => {
                write!(f, "typing started at {} while already typing", at)
            }
            Anomaly::UnexpectedStop { at } => {
                write!(f, "typing stopped at {} while already stopped", at)
            }
            Anomaly::Unbucketed { symbol, count } => write!(
                f,
                "{} press(es) of {:?} before any checkpoint",
                count, symbol
            ),
            Anomaly::Overflow { record } => {
                write!(f, "value out of range in '{}'", record)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    Unreadable { error: String },
    Malformed { content: String, reason: String },
    Anomaly(Anomaly),
}

/// A recoverable problem found while replaying. Replay always continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayWarning {
    pub shard: PathBuf,
    /// 1-based line number, when the problem is tied to a line.
    pub line: Option<usize>,
    pub kind: WarningKind,
}

impl fmt::Display for ReplayWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shard.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        match &self.kind {
            WarningKind::Unreadable { error } => write!(f, ": skipping unreadable shard: {}", error),
            WarningKind::Malformed { content, reason } => {
                write!(f, ": wrong data line {:?}: {}", content, reason)
            }
            WarningKind::Anomaly(anomaly) => write!(f, ": {}", anomaly),
        }
    }
}

/// Shortest and longest interval of one kind, with their start times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DurationRange {
    min: Extremum,
    max: Extremum,
}

impl DurationRange {
    /// The first observation sets both bounds; later ones only replace a
    /// bound they strictly exceed.
    fn observe(range: &mut Option<DurationRange>, duration: i64, since: i64) {
        let candidate = Extremum { duration, since };
        match range {
            None => {
                *range = Some(DurationRange {
                    min: candidate,
                    max: candidate,
                })
            }
            Some(range) => {
                if duration > range.max.duration {
                    range.max = candidate;
                }
                if duration < range.min.duration {
                    range.min = candidate;
                }
            }
        }
    }
}

/// A record value that does not fit the accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutOfRange;

type Transition = std::result::Result<Option<Anomaly>, OutOfRange>;

fn add_count(current: Option<&u64>, count: u64) -> std::result::Result<u64, OutOfRange> {
    current.copied().unwrap_or(0).checked_add(count).ok_or(OutOfRange)
}

/// Session automaton and accumulators for one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayState {
    is_typing: bool,
    has_stopped_once: bool,
    last_started_at: i64,
    last_stopped_at: i64,
    current_hour_bucket: Option<i64>,
    key_counts: BTreeMap<String, u64>,
    hourly: BTreeMap<i64, u64>,
    bursts: Vec<BurstEntry>,
    writing: Option<DurationRange>,
    idle: Option<DurationRange>,
}

impl ReplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn has_stopped_once(&self) -> bool {
        self.has_stopped_once
    }

    pub fn has_min_max_writing(&self) -> bool {
        self.writing.is_some()
    }

    pub fn has_min_max_idle(&self) -> bool {
        self.idle.is_some()
    }

    pub fn current_hour_bucket(&self) -> Option<i64> {
        self.current_hour_bucket
    }

    /// Applies one record. Anomalous records leave the statistics untouched,
    /// except unbucketed presses, which still count per key.
    pub fn apply(&mut self, record: &LogRecord) -> Option<Anomaly> {
        let outcome = match record {
            LogRecord::Checkpoint { at } => self.checkpoint(*at),
            LogRecord::KeyPress { symbol, count } => self.press(symbol, *count),
            LogRecord::SessionStart { at } => self.start_typing(*at),
            LogRecord::SessionStop { at } => self.stop_typing(*at),
        };
        outcome.unwrap_or_else(|OutOfRange| {
            Some(Anomaly::Overflow {
                record: record.clone(),
            })
        })
    }

    fn checkpoint(&mut self, at: i64) -> Transition {
        self.current_hour_bucket = Some(hour_bucket(at).ok_or(OutOfRange)?);
        Ok(None)
    }

    fn press(&mut self, symbol: &str, count: u64) -> Transition {
        // Both sums are checked before either is stored.
        let key_total = add_count(self.key_counts.get(symbol), count)?;
        let hour_total = match self.current_hour_bucket {
            Some(bucket) => Some((bucket, add_count(self.hourly.get(&bucket), count)?)),
            None => None,
        };

        self.key_counts.insert(symbol.to_string(), key_total);
        match hour_total {
            Some((bucket, total)) => {
                self.hourly.insert(bucket, total);
                Ok(None)
            }
            None => Ok(Some(Anomaly::Unbucketed {
                symbol: symbol.to_string(),
                count,
            })),
        }
    }

    fn start_typing(&mut self, at: i64) -> Transition {
        if self.is_typing {
            return Ok(Some(Anomaly::UnexpectedStart { at }));
        }

        if self.has_stopped_once {
            let idle = at.checked_sub(self.last_stopped_at).ok_or(OutOfRange)?;
            self.bursts.push(BurstEntry {
                kind: BurstKind::Stop,
                at: self.last_stopped_at,
                duration: idle,
            });
            DurationRange::observe(&mut self.idle, idle, self.last_stopped_at);
        }

        self.last_started_at = at;
        self.is_typing = true;
        Ok(None)
    }

    fn stop_typing(&mut self, at: i64) -> Transition {
        if !self.is_typing {
            return Ok(Some(Anomaly::UnexpectedStop { at }));
        }

        let writing = at.checked_sub(self.last_started_at).ok_or(OutOfRange)?;
        self.has_stopped_once = true;
        self.bursts.push(BurstEntry {
            kind: BurstKind::Start,
            at: self.last_started_at,
            duration: writing,
        });
        DurationRange::observe(&mut self.writing, writing, self.last_started_at);

        self.last_stopped_at = at;
        self.is_typing = false;
        Ok(None)
    }

    pub fn key_frequency(&self) -> KeyFrequencyReport {
        KeyFrequencyReport {
            counts: self.key_counts.clone(),
        }
    }

    pub fn hourly(&self) -> HourlyReport {
        HourlyReport {
            buckets: self.hourly.clone(),
        }
    }

    pub fn bursts(&self) -> BurstReport {
        BurstReport {
            entries: self.bursts.clone(),
            max_writing: self.writing.map(|range| range.max),
            max_idle: self.idle.map(|range| range.max),
            min_writing: self.writing.map(|range| range.min),
            min_idle: self.idle.map(|range| range.min),
        }
    }
}

/// Result of replaying a set of shards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    state: ReplayState,
    warnings: Vec<ReplayWarning>,
    shards_read: usize,
    records_read: usize,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    pub fn key_frequency(&self) -> KeyFrequencyReport {
        self.state.key_frequency()
    }

    pub fn hourly(&self) -> HourlyReport {
        self.state.hourly()
    }

    pub fn bursts(&self) -> BurstReport {
        self.state.bursts()
    }

    pub fn warnings(&self) -> &[ReplayWarning] {
        &self.warnings
    }

    pub fn shards_read(&self) -> usize {
        self.shards_read
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Reads `path` to its current end and replays it. An unreadable shard
    /// becomes a warning.
    pub fn read_shard(&mut self, path: &Path) {
        info!(shard = %path.display(), "Reading shard");
        match fs::read(path) {
            Ok(bytes) => {
                self.shards_read += 1;
                self.replay_text(path, &String::from_utf8_lossy(&bytes));
            }
            Err(err) => self.warn(ReplayWarning {
                shard: path.to_path_buf(),
                line: None,
                kind: WarningKind::Unreadable {
                    error: err.to_string(),
                },
            }),
        }
    }

    /// Replays shard contents. A trailing fragment without a newline is a
    /// partially written line and is reported as malformed.
    pub fn replay_text(&mut self, shard: &Path, text: &str) {
        for (idx, segment) in text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            let complete = segment.ends_with('\n');
            let line = segment.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                continue;
            }

            if !complete {
                self.warn(ReplayWarning {
                    shard: shard.to_path_buf(),
                    line: Some(line_no),
                    kind: WarningKind::Malformed {
                        content: line.to_string(),
                        reason: "incomplete final line".to_string(),
                    },
                });
                continue;
            }

            match LogRecord::decode(line) {
                Ok(record) => {
                    self.records_read += 1;
                    if let Some(anomaly) = self.state.apply(&record) {
                        self.warn(ReplayWarning {
                            shard: shard.to_path_buf(),
                            line: Some(line_no),
                            kind: WarningKind::Anomaly(anomaly),
                        });
                    }
                }
                Err(err) => self.warn(ReplayWarning {
                    shard: shard.to_path_buf(),
                    line: Some(line_no),
                    kind: WarningKind::Malformed {
                        content: line.to_string(),
                        reason: err.to_string(),
                    },
                }),
            }
        }
    }

    fn warn(&mut self, warning: ReplayWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    store: ShardStore,
}

impl Analyzer {
    pub fn new(store: ShardStore) -> Self {
        Self { store }
    }

    /// Replays every shard in the store. Fails with `NoData` when there are
    /// no shards at all.
    pub fn analyze(&self) -> Result<Replay> {
        let shards = self.store.list_shards()?;
        let mut replay = Replay::new();
        for shard in &shards {
            replay.read_shard(&shard.path);
        }

        info!(
            shards = replay.shards_read(),
            records = replay.records_read(),
            warnings = replay.warnings().len(),
            "Replay complete"
        );
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(text: &str) -> Replay {
        let mut replay = Replay::new();
        replay.replay_text(Path::new("test.log"), text);
        replay
    }

    #[test]
    fn hour_bucket_floors_to_hour() {
        assert_eq!(hour_bucket(0), Some(0));
        assert_eq!(hour_bucket(3599), Some(0));
        assert_eq!(hour_bucket(3600), Some(3600));
        assert_eq!(hour_bucket(7201), Some(7200));
        assert_eq!(hour_bucket(-1), Some(-3600));
        assert_eq!(hour_bucket(i64::MIN), None);
    }

    #[test]
    fn key_presses_are_bucketed_by_preceding_checkpoint() {
        let replay = replay(
            "9 Save: 3700\n1 Press (a): 2\n1 Press (b): 1\n9 Save: 7300\n1 Press (a): 4\n",
        );

        let keys = replay.key_frequency().counts;
        assert_eq!(keys.get("a"), Some(&6));
        assert_eq!(keys.get("b"), Some(&1));

        let hourly = replay.hourly().buckets;
        assert_eq!(hourly.get(&3600), Some(&3));
        assert_eq!(hourly.get(&7200), Some(&4));
        assert!(replay.warnings().is_empty());
    }

    #[test]
    fn press_before_checkpoint_counts_per_key_only() {
        let replay = replay("1 Press (a): 2\n");

        assert_eq!(replay.key_frequency().counts.get("a"), Some(&2));
        assert!(replay.hourly().buckets.is_empty());
        assert_eq!(replay.warnings().len(), 1);
        assert!(matches!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::Unbucketed { .. })
        ));
    }

    #[test]
    fn sessions_produce_history_and_extremes() {
        let replay = replay(
            "9 Save: 0\n\
             8 Start typing: 0\n\
             7 Stop typing: 10\n\
             8 Start typing: 40\n\
             7 Stop typing: 43\n\
             8 Start typing: 50\n\
             7 Stop typing: 80\n",
        );

        let bursts = replay.bursts();
        let history: Vec<String> = bursts.entries.iter().map(BurstEntry::render).collect();
        assert_eq!(
            history,
            vec![
                "Start;0;10",
                "Stop;10;30",
                "Start;40;3",
                "Stop;43;7",
                "Start;50;30",
            ]
        );
        assert_eq!(
            bursts.max_writing,
            Some(Extremum {
                duration: 30,
                since: 50
            })
        );
        assert_eq!(
            bursts.min_writing,
            Some(Extremum {
                duration: 3,
                since: 40
            })
        );
        assert_eq!(
            bursts.max_idle,
            Some(Extremum {
                duration: 30,
                since: 10
            })
        );
        assert_eq!(
            bursts.min_idle,
            Some(Extremum {
                duration: 7,
                since: 43
            })
        );
    }

    #[test]
    fn equal_durations_keep_first_extremum() {
        let replay = replay(
            "8 Start typing: 0\n7 Stop typing: 5\n8 Start typing: 10\n7 Stop typing: 15\n",
        );
        let bursts = replay.bursts();
        assert_eq!(bursts.max_writing.map(|e| e.since), Some(0));
        assert_eq!(bursts.min_writing.map(|e| e.since), Some(0));
    }

    #[test]
    fn double_start_is_ignored_with_warning() {
        let replay = replay(
            "8 Start typing: 0\n8 Start typing: 5\n7 Stop typing: 9\n",
        );

        let history = replay.bursts().render_history();
        assert_eq!(history, "Start;0;9\n");
        assert_eq!(replay.warnings().len(), 1);
        assert_eq!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::UnexpectedStart { at: 5 })
        );
        assert_eq!(replay.warnings()[0].line, Some(2));
    }

    #[test]
    fn stop_while_idle_is_ignored_with_warning() {
        let replay = replay("7 Stop typing: 3\n8 Start typing: 5\n7 Stop typing: 6\n");

        // The stray stop must not count as a first stop.
        assert_eq!(replay.bursts().render_history(), "Start;5;1\n");
        assert_eq!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::UnexpectedStop { at: 3 })
        );
        assert!(!replay.state().is_typing());
        assert!(replay.state().has_stopped_once());
        assert!(replay.state().has_min_max_writing());
        assert!(!replay.state().has_min_max_idle());
    }

    #[test]
    fn key_count_overflow_is_ignored_with_warning() {
        let replay = replay("9 Save: 0\n1 Press (a): 18446744073709551615\n1 Press (a): 1\n");

        assert_eq!(replay.key_frequency().counts.get("a"), Some(&u64::MAX));
        assert_eq!(replay.hourly().buckets.get(&0), Some(&u64::MAX));
        assert_eq!(replay.warnings().len(), 1);
        assert_eq!(replay.warnings()[0].line, Some(3));
        assert_eq!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::Overflow {
                record: LogRecord::KeyPress {
                    symbol: "a".to_string(),
                    count: 1,
                },
            })
        );
    }

    #[test]
    fn hourly_overflow_leaves_key_counts_untouched() {
        let replay = replay("9 Save: 0\n1 Press (a): 18446744073709551615\n1 Press (b): 1\n");

        assert_eq!(replay.key_frequency().counts.get("b"), None);
        assert_eq!(replay.hourly().buckets.get(&0), Some(&u64::MAX));
        assert_eq!(replay.warnings().len(), 1);
        assert!(matches!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::Overflow { .. })
        ));
    }

    #[test]
    fn checkpoint_outside_bucket_range_is_ignored_with_warning() {
        let replay = replay("9 Save: -9223372036854775808\n1 Press (a): 2\n");

        assert_eq!(replay.state().current_hour_bucket(), None);
        assert_eq!(replay.key_frequency().counts.get("a"), Some(&2));
        assert!(replay.hourly().buckets.is_empty());
        assert_eq!(replay.warnings().len(), 2);
        assert_eq!(
            replay.warnings()[0].kind,
            WarningKind::Anomaly(Anomaly::Overflow {
                record: LogRecord::Checkpoint { at: i64::MIN },
            })
        );
        assert!(matches!(
            replay.warnings()[1].kind,
            WarningKind::Anomaly(Anomaly::Unbucketed { .. })
        ));
    }

    #[test]
    fn writing_duration_overflow_is_ignored_with_warning() {
        let replay = replay(
            "8 Start typing: -9223372036854775808\n7 Stop typing: 9223372036854775807\n",
        );

        assert!(replay.state().is_typing());
        assert!(!replay.state().has_stopped_once());
        assert!(!replay.state().has_min_max_writing());
        assert_eq!(replay.bursts().render_history(), "");
        assert_eq!(replay.warnings().len(), 1);
        assert_eq!(replay.warnings()[0].line, Some(2));
        assert!(replay.warnings()[0].to_string().contains("out of range"));
    }

    #[test]
    fn idle_duration_overflow_is_ignored_with_warning() {
        let replay = replay(
            "8 Start typing: -9223372036854775808\n\
             7 Stop typing: -9223372036854775800\n\
             8 Start typing: 9223372036854775807\n",
        );

        assert!(!replay.state().is_typing());
        assert!(!replay.state().has_min_max_idle());
        assert_eq!(
            replay.bursts().render_history(),
            "Start;-9223372036854775808;8\n"
        );
        assert_eq!(replay.warnings().len(), 1);
        assert_eq!(replay.warnings()[0].line, Some(3));
    }

    #[test]
    fn empty_lines_are_skipped_silently() {
        let replay = replay("\n9 Save: 0\n\n\r\n1 Press (a): 1\n");
        assert!(replay.warnings().is_empty());
        assert_eq!(replay.records_read(), 2);
    }

    #[test]
    fn malformed_line_is_reported_and_skipped() {
        let replay = replay("9 Save: 0\ngarbage\n1 Press (a): 1\n");

        assert_eq!(replay.key_frequency().counts.get("a"), Some(&1));
        assert_eq!(replay.warnings().len(), 1);
        let warning = &replay.warnings()[0];
        assert_eq!(warning.line, Some(2));
        assert!(matches!(warning.kind, WarningKind::Malformed { .. }));
        assert!(warning.to_string().contains("wrong data line \"garbage\""));
    }

    #[test]
    fn incomplete_final_line_is_malformed() {
        let replay = replay("9 Save: 0\n1 Press (a): 1\n1 Press (b): 12");

        assert_eq!(replay.key_frequency().counts.get("b"), None);
        assert_eq!(replay.warnings().len(), 1);
        assert_eq!(replay.warnings()[0].line, Some(3));
    }

    #[test]
    fn unreadable_shard_is_skipped_with_warning() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut replay = Replay::new();
        replay.read_shard(&temp_dir.path().join("missing.log"));

        assert_eq!(replay.shards_read(), 0);
        assert!(matches!(
            replay.warnings()[0].kind,
            WarningKind::Unreadable { .. }
        ));
    }
}
