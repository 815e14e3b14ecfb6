//! Error types for keytally-core operations.
//!
//! Only setup and no-data conditions are errors. Malformed lines and session
//! protocol violations found during replay are recoverable and surface as
//! [`crate::analyzer::ReplayWarning`] instead.

use std::path::PathBuf;

/// All errors that can occur in keytally-core operations.
#[derive(Debug, thiserror::Error)]
pub enum KeytallyError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Shard Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Shard directory unavailable: {path}: {source}")]
    ShardDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create shard {path}: {source}")]
    ShardCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write shard {path}: {source}")]
    ShardWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No data to analyze in {0}")]
    NoData(PathBuf),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using KeytallyError.
pub type Result<T> = std::result::Result<T, KeytallyError>;

