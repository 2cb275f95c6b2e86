//! Fetch collaborators that turn an upstream batch into normalized incidents.

pub mod file;
pub mod pagerduty;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::StatsError;
use crate::incident::Incident;
use crate::window::TimeWindow;

pub use file::{parse_incidents, JsonFileSource};
pub use pagerduty::PagerDutyClient;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid base url {url}: {source}")]
    Url {
        source: url::ParseError,
        url: String,
    },
    #[error("API token is not a valid Authorization header value")]
    InvalidToken,
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("failed to read incidents from {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Incident(#[from] StatsError),
}

/// Provides the page-complete batch of incidents created inside a window.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// `log_entries_for` names an escalation policy whose incidents need
    /// their log attached. Only the flake filter reads logs.
    async fn fetch(
        &self,
        window: &TimeWindow,
        log_entries_for: Option<&str>,
    ) -> Result<Vec<Incident>, SourceError>;
}
