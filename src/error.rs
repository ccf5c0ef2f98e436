use std::path::PathBuf;

use thiserror::Error;

use crate::log_fetcher::QueryStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("--query is required unless --cached is specified")]
    MissingQuery,

    #[error("start time {start} is after end time {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No log groups found for pattern {pattern:?}")]
    NoLogGroup { pattern: String },

    #[error("More than one log group found for pattern {pattern:?}: {}", .matches.join(", "))]
    AmbiguousLogGroup {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("Query ended with status {0}")]
    QueryEnded(QueryStatus),

    #[error("No cached result in slot {slot:?} (looked for {path})")]
    CacheMiss { slot: String, path: PathBuf },

    #[error("Row {row} does not match the header fields (expected [{expected}], found [{found}])")]
    MisalignedRow {
        row: usize,
        expected: String,
        found: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::MissingQuery
            | Error::InvalidTimeRange { .. }
            | Error::InvalidArgument(_)
            | Error::NoLogGroup { .. }
            | Error::AmbiguousLogGroup { .. } => 2,
            Error::Remote { .. } => 3,
            Error::QueryEnded(_) => 4,
            Error::CacheMiss { .. } => 5,
            Error::MisalignedRow { .. } | Error::Io(_) | Error::Json(_) | Error::Config(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
