//! `keytally analyze`: replay every shard and print one report on stdout.
//!
//! Replay warnings go to stderr through tracing and never change the exit
//! status. Only an empty or missing shard directory fails.

use crate::CliError;
use clap::ValueEnum;
use keytally_core::{Analyzer, Replay, ShardStore};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportView {
    /// Presses per key symbol
    Keycount,
    /// Typing and idle intervals with extremes
    Burst,
    /// Presses per hour
    Hourly,
}

pub fn run(view: ReportView, shard_dir: PathBuf, json: bool) -> Result<(), CliError> {
    let replay = Analyzer::new(ShardStore::new(shard_dir)).analyze()?;
    let output = render(view, &replay, json)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;

    if !replay.warnings().is_empty() {
        tracing::warn!(
            count = replay.warnings().len(),
            "Replay finished with warnings"
        );
    }
    Ok(())
}

fn render(view: ReportView, replay: &Replay, json: bool) -> Result<String, serde_json::Error> {
    if json {
        let mut out = match view {
            ReportView::Keycount => serde_json::to_string_pretty(&replay.key_frequency())?,
            ReportView::Burst => serde_json::to_string_pretty(&replay.bursts())?,
            ReportView::Hourly => serde_json::to_string_pretty(&replay.hourly())?,
        };
        out.push('\n');
        return Ok(out);
    }

    Ok(match view {
        ReportView::Keycount => replay.key_frequency().render(),
        ReportView::Burst => replay.bursts().render(),
        ReportView::Hourly => replay.hourly().render(),
    })
}
