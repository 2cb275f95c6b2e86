//! Read-only PagerDuty REST v2 client.
//!
//! Lists incidents created inside a window, following `limit`/`offset`
//! pagination until the API reports no more pages, and optionally attaches
//! each incident's log entries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{IncidentSource, SourceError};
use crate::config::PagerDutySection;
use crate::incident::{Incident, RawIncident, RawLogEntry};
use crate::window::TimeWindow;

pub const ENV_API_TOKEN: &str = "PAGERDUTY_API_TOKEN";

const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

#[derive(Debug, Deserialize)]
struct IncidentPage {
    #[serde(default)]
    incidents: Vec<RawIncident>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct LogEntryPage {
    #[serde(default)]
    log_entries: Vec<RawLogEntry>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    client: reqwest::Client,
    base_url: Url,
    authorization: HeaderValue,
    page_size: u32,
}

impl PagerDutyClient {
    pub fn new(base_url: &str, token: impl AsRef<str>) -> Result<Self, SourceError> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|source| SourceError::Url {
            source,
            url: base_url.to_string(),
        })?;
        let mut authorization = HeaderValue::from_str(&format!("Token token={}", token.as_ref()))
            .map_err(|_| SourceError::InvalidToken)?;
        authorization.set_sensitive(true);
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            authorization,
            page_size: 100,
        })
    }

    pub fn from_config(section: &PagerDutySection, token: impl AsRef<str>) -> Result<Self, SourceError> {
        Ok(Self::new(&section.base_url, token)?.with_page_size(section.page_size))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = self.base_url.join(path).map_err(|source| SourceError::Url {
            source,
            url: format!("{}{path}", self.base_url),
        })?;
        let response = self
            .client
            .get(url)
            .headers(self.headers())
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint = path, status = %status, "PagerDuty request failed");
            return Err(SourceError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Every incident whose creation falls inside `window`.
    pub async fn list_incidents(&self, window: &TimeWindow) -> Result<Vec<RawIncident>, SourceError> {
        let mut incidents = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("since", window.since_param()),
                ("until", window.until_param()),
                ("time_zone", "UTC".to_string()),
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: IncidentPage = self.get_page("incidents", &query).await?;
            let received = page.incidents.len();
            tracing::debug!(offset, received, more = page.more, "fetched incident page");
            incidents.extend(page.incidents);
            if !page.more || received == 0 {
                break;
            }
            offset += received;
        }
        Ok(incidents)
    }

    pub async fn list_log_entries(&self, incident_id: &str) -> Result<Vec<RawLogEntry>, SourceError> {
        let path = format!("incidents/{incident_id}/log_entries");
        let mut entries = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("time_zone", "UTC".to_string()),
                ("limit", self.page_size.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: LogEntryPage = self.get_page(&path, &query).await?;
            let received = page.log_entries.len();
            entries.extend(page.log_entries);
            if !page.more || received == 0 {
                break;
            }
            offset += received;
        }
        Ok(entries)
    }
}

#[async_trait]
impl IncidentSource for PagerDutyClient {
    async fn fetch(
        &self,
        window: &TimeWindow,
        log_entries_for: Option<&str>,
    ) -> Result<Vec<Incident>, SourceError> {
        let mut raw = self.list_incidents(window).await?;
        if let Some(policy) = log_entries_for {
            for incident in raw.iter_mut() {
                let in_policy = incident
                    .escalation_policy
                    .as_ref()
                    .and_then(|reference| reference.id.as_deref())
                    == Some(policy);
                if !in_policy {
                    continue;
                }
                if let Some(id) = incident.id.clone() {
                    incident.log_entries = self.list_log_entries(&id).await?;
                }
            }
        }
        tracing::info!(
            since = %window.since_param(),
            until = %window.until_param(),
            incidents = raw.len(),
            log_entries_for = log_entries_for.unwrap_or("-"),
            "fetched incidents from PagerDuty"
        );
        raw.into_iter()
            .map(|incident| Incident::try_from(incident).map_err(SourceError::from))
            .collect()
    }
}
