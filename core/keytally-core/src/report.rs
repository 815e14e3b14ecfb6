//! Report views produced by a full replay.
//!
//! Reports hold structured data; text rendering happens only here, at the
//! edge. All of them serialize for `--json` output.

use chrono::{Local, TimeZone};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Formats an epoch timestamp as local `dd/mm/YYYY HH:MM`.
pub fn format_timestamp(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyFrequencyReport {
    pub counts: BTreeMap<String, u64>,
}

impl KeyFrequencyReport {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// `symbol;count` per line, ordered by symbol.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (symbol, count) in &self.counts {
            let _ = writeln!(out, "{};{}", symbol, count);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HourlyReport {
    /// Hour start (epoch seconds) to key presses flushed within that hour.
    pub buckets: BTreeMap<i64, u64>,
}

impl HourlyReport {
    /// `epoch;dd/mm/YYYY HH:MM;count` per line, oldest first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (hour, count) in &self.buckets {
            let _ = writeln!(out, "{};{};{}", hour, format_timestamp(*hour), count);
        }
        out
    }
}

/// `Start` entries are typing intervals; `Stop` entries are idle gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstKind {
    Start,
    Stop,
}

impl BurstKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BurstKind::Start => "Start",
            BurstKind::Stop => "Stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BurstEntry {
    pub kind: BurstKind,
    /// When the interval began.
    pub at: i64,
    /// Interval length in seconds.
    pub duration: i64,
}

impl BurstEntry {
    pub fn render(&self) -> String {
        format!("{};{};{}", self.kind.as_str(), self.at, self.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extremum {
    pub duration: i64,
    /// When the extremal interval began.
    pub since: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BurstReport {
    pub entries: Vec<BurstEntry>,
    pub max_writing: Option<Extremum>,
    pub max_idle: Option<Extremum>,
    pub min_writing: Option<Extremum>,
    pub min_idle: Option<Extremum>,
}

impl BurstReport {
    /// `Start|Stop;timestamp;duration` per line, in replay order.
    pub fn render_history(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for (label, extremum) in [
            ("Max writing time", self.max_writing),
            ("Max idle time", self.max_idle),
            ("Min writing time", self.min_writing),
            ("Min idle time", self.min_idle),
        ] {
            let _ = match extremum {
                Some(value) => writeln!(
                    out,
                    "{}: {}s since {}",
                    label,
                    value.duration,
                    format_timestamp(value.since)
                ),
                None => writeln!(out, "{}: n/a", label),
            };
        }
        out
    }

    pub fn render(&self) -> String {
        format!("{}{}", self.render_history(), self.render_summary())
    }
}
