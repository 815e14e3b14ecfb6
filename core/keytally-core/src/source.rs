//! Key event sources.
//!
//! The OS-level keyboard hook lives outside this crate. Whatever produces key
//! events feeds them through a [`KeyEventSource`]; the recorder pulls from it
//! one event at a time and stops on [`SourceEvent::Shutdown`] or when the
//! source runs dry.
//!
//! ## Line protocol
//!
//! [`spawn_line_reader`] turns text lines into events, so any hook can pipe
//! into `keytally record`:
//!
//! ```text
//! press a          -> Press("a")
//! release a        -> Release("a")
//! Escape           -> Press("Escape")
//! ```

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Press(String),
    Release(String),
    Shutdown,
}

pub trait KeyEventSource {
    /// Blocks until the next event. `None` means the source is exhausted.
    fn next_event(&mut self) -> Option<SourceEvent>;
}

/// Sending half of a [`ChannelSource`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<SourceEvent>,
}

impl EventSender {
    /// Returns false once the receiving side is gone.
    pub fn send(&self, event: SourceEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn press(&self, symbol: impl Into<String>) -> bool {
        self.send(SourceEvent::Press(symbol.into()))
    }

    /// Asks the recorder to drain and stop.
    pub fn shutdown(&self) -> bool {
        self.send(SourceEvent::Shutdown)
    }
}

#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<SourceEvent>,
}

impl ChannelSource {
    pub fn new() -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel();
        (Self { rx }, EventSender { tx })
    }
}

impl KeyEventSource for ChannelSource {
    fn next_event(&mut self) -> Option<SourceEvent> {
        self.rx.recv().ok()
    }
}

/// Any iterator of events is a source. Handy for replaying fixtures.
impl<I> KeyEventSource for I
where
    I: Iterator<Item = SourceEvent>,
{
    fn next_event(&mut self) -> Option<SourceEvent> {
        self.next()
    }
}

pub fn parse_source_line(line: &str) -> Option<SourceEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some((kind, symbol)) = line.split_once(char::is_whitespace) {
        let symbol = symbol.trim();
        match kind {
            "press" if !symbol.is_empty() => return Some(SourceEvent::Press(symbol.to_string())),
            "release" if !symbol.is_empty() => {
                return Some(SourceEvent::Release(symbol.to_string()))
            }
            _ => {}
        }
    }

    Some(SourceEvent::Press(line.to_string()))
}

/// Forwards parsed lines from `reader` and sends `Shutdown` at end of input.
pub fn spawn_line_reader<R>(reader: R, sender: EventSender) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to read key event line");
                    break;
                }
            };
            if let Some(event) = parse_source_line(&line) {
                if !sender.send(event) {
                    return;
                }
            }
        }
        sender.shutdown();
    })
}
