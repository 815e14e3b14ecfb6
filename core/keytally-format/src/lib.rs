//! Shard line format for keytally.
//!
//! This crate is shared by the recorder and the analyzer to prevent schema
//! drift. Every shard file is a sequence of newline-terminated lines, one
//! [`LogRecord`] per line:
//!
//! ```text
//! 9 Save: 1700000120
//! 8 Start typing: 1700000000
//! 1 Press (Escape): 5
//! 7 Stop typing: 1700000002
//! ```
//!
//! The leading number selects the variant. Labels exist for humans reading
//! the file; the decoder only looks at the code, the parentheses and the
//! value after the colon.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const KEY_PRESS_CODE: u8 = 1;
pub const SESSION_STOP_CODE: u8 = 7;
pub const SESSION_START_CODE: u8 = 8;
pub const CHECKPOINT_CODE: u8 = 9;

/// One line of a shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    /// Presses of `symbol` accumulated since the previous flush.
    KeyPress { symbol: String, count: u64 },
    /// Typing ceased at `at`; an idle gap began.
    SessionStop { at: i64 },
    /// Typing resumed at `at`; the idle gap ended.
    SessionStart { at: i64 },
    /// A flush happened at `at`. Buckets the key presses that follow it.
    Checkpoint { at: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing space after record code")]
    MissingSpace,

    #[error("unknown record code: {0:?}")]
    UnknownCode(String),

    #[error("key press record has no (symbol)")]
    MissingParens,

    #[error("missing ':' before value")]
    MissingColon,

    #[error("value is not an integer: {0:?}")]
    InvalidNumber(String),
}

impl LogRecord {
    pub fn code(&self) -> u8 {
        match self {
            LogRecord::KeyPress { .. } => KEY_PRESS_CODE,
            LogRecord::SessionStop { .. } => SESSION_STOP_CODE,
            LogRecord::SessionStart { .. } => SESSION_START_CODE,
            LogRecord::Checkpoint { .. } => CHECKPOINT_CODE,
        }
    }

    /// Encodes the record as a single line, without the trailing newline.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes one line (without its newline) back into a record.
    pub fn decode(line: &str) -> Result<LogRecord, DecodeError> {
        let space = line.find(' ').ok_or(DecodeError::MissingSpace)?;
        let code = &line[..space];

        match code.parse::<u8>() {
            Ok(KEY_PRESS_CODE) => decode_key_press(line, space),
            Ok(SESSION_STOP_CODE) => parse_at(line).map(|at| LogRecord::SessionStop { at }),
            Ok(SESSION_START_CODE) => parse_at(line).map(|at| LogRecord::SessionStart { at }),
            Ok(CHECKPOINT_CODE) => parse_at(line).map(|at| LogRecord::Checkpoint { at }),
            _ => Err(DecodeError::UnknownCode(code.to_string())),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::KeyPress { symbol, count } => {
                write!(f, "{} Press ({}): {}", KEY_PRESS_CODE, symbol, count)
            }
            LogRecord::SessionStop { at } => write!(f, "{} Stop typing: {}", SESSION_STOP_CODE, at),
            LogRecord::SessionStart { at } => {
                write!(f, "{} Start typing: {}", SESSION_START_CODE, at)
            }
            LogRecord::Checkpoint { at } => write!(f, "{} Save: {}", CHECKPOINT_CODE, at),
        }
    }
}

impl FromStr for LogRecord {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogRecord::decode(s)
    }
}

/// Returns false for symbols that would not survive an encode/decode cycle.
///
/// The decoder ends the symbol at the first `)`, and a line break would split
/// the record in two.
pub fn is_representable_symbol(symbol: &str) -> bool {
    !symbol.contains([')', '\n', '\r'])
}

fn decode_key_press(line: &str, offset: usize) -> Result<LogRecord, DecodeError> {
    let open = line[offset..]
        .find('(')
        .map(|idx| offset + idx)
        .ok_or(DecodeError::MissingParens)?;
    let close = line[open..]
        .find(')')
        .map(|idx| open + idx)
        .ok_or(DecodeError::MissingParens)?;
    let symbol = &line[open + 1..close];

    let colon = line[close..]
        .find(':')
        .map(|idx| close + idx)
        .ok_or(DecodeError::MissingColon)?;
    let count = parse_number::<u64>(&line[colon + 1..])?;

    Ok(LogRecord::KeyPress {
        symbol: symbol.to_string(),
        count,
    })
}

fn parse_at(line: &str) -> Result<i64, DecodeError> {
    let colon = line.find(':').ok_or(DecodeError::MissingColon)?;
    parse_number::<i64>(&line[colon + 1..])
}

fn parse_number<T: FromStr>(raw: &str) -> Result<T, DecodeError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<T>()
        .map_err(|_| DecodeError::InvalidNumber(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_key_press_with_symbol_in_parens() {
        let record = LogRecord::KeyPress {
            symbol: "Escape".to_string(),
            count: 5,
        };
        assert_eq!(record.encode(), "1 Press (Escape): 5");
    }

    #[test]
    fn encodes_transitions_and_checkpoint() {
        assert_eq!(
            LogRecord::SessionStop { at: 1_700_000_002 }.encode(),
            "7 Stop typing: 1700000002"
        );
        assert_eq!(
            LogRecord::SessionStart { at: 1_700_000_000 }.encode(),
            "8 Start typing: 1700000000"
        );
        assert_eq!(
            LogRecord::Checkpoint { at: 1_700_000_120 }.encode(),
            "9 Save: 1700000120"
        );
    }

    #[test]
    fn decode_reverses_encode() {
        let records = [
            LogRecord::KeyPress {
                symbol: "space".to_string(),
                count: 42,
            },
            LogRecord::KeyPress {
                symbol: "a:b(".to_string(),
                count: 1,
            },
            LogRecord::KeyPress {
                symbol: String::new(),
                count: 1,
            },
            LogRecord::KeyPress {
                symbol: "(".to_string(),
                count: 1,
            },
            LogRecord::KeyPress {
                symbol: "Ä½ß€".to_string(),
                count: 3,
            },
            LogRecord::KeyPress {
                symbol: " Page Up ".to_string(),
                count: 2,
            },
            LogRecord::KeyPress {
                symbol: "Shift_L".to_string(),
                count: u64::MAX,
            },
            LogRecord::SessionStop { at: 2 },
            LogRecord::SessionStart { at: 22 },
            LogRecord::Checkpoint { at: -3600 },
            LogRecord::SessionStop { at: i64::MIN },
            LogRecord::SessionStart { at: i64::MAX },
            LogRecord::Checkpoint { at: i64::MIN },
            LogRecord::Checkpoint { at: i64::MAX },
        ];

        for record in records {
            let line = record.encode();
            assert_eq!(LogRecord::decode(&line), Ok(record), "line: {}", line);
        }
    }

    #[test]
    fn every_representable_symbol_survives_decode() {
        let symbols = (' '..='~')
            .chain(['\t', 'é', '中', '🙂'])
            .map(String::from)
            .chain(["a b", "((", ": 1", "1 Press (x", "9 Save: 5"].map(String::from));

        for symbol in symbols {
            let record = LogRecord::KeyPress {
                symbol: symbol.clone(),
                count: 7,
            };
            let decoded = LogRecord::decode(&record.encode());
            if is_representable_symbol(&symbol) {
                assert_eq!(decoded, Ok(record), "symbol: {:?}", symbol);
            } else {
                assert_ne!(decoded, Ok(record), "symbol: {:?}", symbol);
            }
        }
    }

    #[test]
    fn decodes_legacy_spacing_before_colon() {
        let record: LogRecord = "1 Press (Return) : 7".parse().expect("decode");
        assert_eq!(
            record,
            LogRecord::KeyPress {
                symbol: "Return".to_string(),
                count: 7,
            }
        );
    }

    #[test]
    fn decodes_trailing_carriage_return() {
        assert_eq!(
            LogRecord::decode("9 Save: 3600\r"),
            Ok(LogRecord::Checkpoint { at: 3600 })
        );
    }

    #[test]
    fn rejects_line_without_space() {
        assert_eq!(LogRecord::decode("9Save:1"), Err(DecodeError::MissingSpace));
    }

    #[test]
    fn rejects_unknown_code() {
        assert_eq!(
            LogRecord::decode("4 Something: 1"),
            Err(DecodeError::UnknownCode("4".to_string()))
        );
        assert_eq!(
            LogRecord::decode("x Save: 1"),
            Err(DecodeError::UnknownCode("x".to_string()))
        );
    }

    #[test]
    fn rejects_key_press_without_parens() {
        assert_eq!(
            LogRecord::decode("1 Press a: 3"),
            Err(DecodeError::MissingParens)
        );
        assert_eq!(
            LogRecord::decode("1 Press (a: 3"),
            Err(DecodeError::MissingParens)
        );
    }

    #[test]
    fn rejects_missing_colon() {
        assert_eq!(
            LogRecord::decode("1 Press (a) 3"),
            Err(DecodeError::MissingColon)
        );
        assert_eq!(
            LogRecord::decode("8 Start typing 3"),
            Err(DecodeError::MissingColon)
        );
    }

    #[test]
    fn rejects_non_integer_payload() {
        assert_eq!(
            LogRecord::decode("7 Stop typing: soon"),
            Err(DecodeError::InvalidNumber("soon".to_string()))
        );
        assert_eq!(
            LogRecord::decode("1 Press (a): -1"),
            Err(DecodeError::InvalidNumber("-1".to_string()))
        );
        assert_eq!(
            LogRecord::decode("9 Save: "),
            Err(DecodeError::InvalidNumber(String::new()))
        );
    }

    #[test]
    fn closing_paren_and_newlines_are_not_representable() {
        assert!(is_representable_symbol("parenright"));
        assert!(is_representable_symbol("("));
        assert!(!is_representable_symbol(")"));
        assert!(!is_representable_symbol("a\nb"));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&LogRecord::SessionStart { at: 5 }).expect("json");
        assert_eq!(json, r#"{"type":"session_start","at":5}"#);
    }
}
