use std::path::PathBuf;

use thiserror::Error;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error("Directory watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("Unknown report dialect: {key}")]
    UnknownDialect { key: String },

    #[error("Report abandoned: {path} did not grow after {retries} attempts")]
    Abandoned { path: PathBuf, retries: u32 },
}

/// Structural problems found while traversing a report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected root element <{found}>: {expected}")]
    UnexpectedRoot { found: String, expected: String },

    #[error("malformed XML at byte {position}: {details}")]
    Syntax { position: u64, details: String },

    #[error("invalid element pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },
}

/// Errors raised by the directory watcher and the report queue
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Report queue is closed")]
    QueueClosed,

    #[error("Worker thread '{name}' panicked")]
    WorkerPanicked { name: String },
}

impl From<crate::config::ConfigError> for ReportError {
    fn from(err: crate::config::ConfigError) -> Self {
        ReportError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ReportError>;

/// Parse result type alias
pub type ParseResult<T> = std::result::Result<T, ParseError>;
