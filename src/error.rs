//! Error taxonomy (§7): input errors are fatal to a session, row/rule/
//! per-point persistence errors are counted and skipped, system-wide
//! persistence errors escalate and stop the replay.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("config field {field} out of range (value {value})")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Class (i): fatal to the session.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {0}")]
    NotFound(String),
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("failed to decompress input: {0}")]
    Decompress(String),
    #[error("missing required column(s): {0:?}")]
    MissingColumns(Vec<String>),
    #[error("no valid points found in input")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Class (iv)/(v): raised by a `Store` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence backend unreachable: {0}")]
    Unreachable(String),
    #[error("persistence operation failed: {0}")]
    Operation(String),
}

/// Raised by `session` when a start is attempted while one is already running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a replay session is already running")]
    Conflict,
    #[error(transparent)]
    Load(#[from] LoadError),
}
