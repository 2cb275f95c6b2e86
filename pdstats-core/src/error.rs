use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised by the classification core. Empty selections are not errors.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("malformed timestamp {input:?}: {reason}")]
    MalformedTimestamp { input: String, reason: String },
    #[error("invalid window: end {end} precedes start {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("window span {span} reaches outside the supported date range")]
    SpanOutOfRange { span: chrono::Duration },
    #[error("malformed incident {id}: {reason}")]
    MalformedIncident { id: String, reason: String },
}

impl StatsError {
    pub(crate) fn malformed_timestamp(input: &str, reason: impl Into<String>) -> Self {
        StatsError::MalformedTimestamp {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_incident(id: Option<&str>, reason: impl Into<String>) -> Self {
        StatsError::MalformedIncident {
            id: id.unwrap_or("<unknown>").to_string(),
            reason: reason.into(),
        }
    }
}

pub type StatsResult<T> = std::result::Result<T, StatsError>;
