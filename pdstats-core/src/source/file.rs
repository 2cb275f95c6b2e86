use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::{IncidentSource, SourceError};
use crate::incident::{Incident, RawIncident};
use crate::window::TimeWindow;

#[derive(Deserialize)]
#[serde(untagged)]
enum IncidentDocument {
    List(Vec<RawIncident>),
    Envelope { incidents: Vec<RawIncident> },
}

/// Parses a JSON array of incidents, or an API style `{"incidents": [...]}`
/// page, into normalized records.
pub fn parse_incidents(json: &str) -> Result<Vec<Incident>, SourceError> {
    let raw = match serde_json::from_str::<IncidentDocument>(json)? {
        IncidentDocument::List(raw) => raw,
        IncidentDocument::Envelope { incidents } => incidents,
    };
    raw.into_iter()
        .map(|incident| Incident::try_from(incident).map_err(SourceError::from))
        .collect()
}

/// Incidents exported to disk, with log entries inline.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl IncidentSource for JsonFileSource {
    async fn fetch(
        &self,
        window: &TimeWindow,
        _log_entries_for: Option<&str>,
    ) -> Result<Vec<Incident>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                source,
                path: self.path.clone(),
            })?;
        let incidents = parse_incidents(&content)?;
        let total = incidents.len();
        let inside: Vec<_> = incidents
            .into_iter()
            .filter(|incident| window.contains(incident.created_at))
            .collect();
        tracing::info!(
            path = %self.path.display(),
            total,
            in_window = inside.len(),
            "loaded incidents from file"
        );
        Ok(inside)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures::instant;
    use tempfile::TempDir;

    const BATCH: &str = r#"[
        {"id": "P1", "status": "resolved", "title": "a",
         "created_at": "2015-01-01T00:00:00Z", "last_status_change_at": "2015-01-01T00:01:00Z",
         "escalation_policy": {"id": "POPS"}},
        {"id": "P2", "status": "resolved", "title": "b",
         "created_at": "2015-01-03T00:00:00Z", "last_status_change_at": "2015-01-03T00:01:00Z",
         "escalation_policy": {"id": "POPS"}}
    ]"#;

    #[test]
    fn accepts_list_and_envelope() {
        assert_eq!(parse_incidents(BATCH).unwrap().len(), 2);
        let envelope = format!("{{\"incidents\": {BATCH}, \"more\": false}}");
        assert_eq!(parse_incidents(&envelope).unwrap().len(), 2);
    }

    #[test]
    fn malformed_record_fails_the_batch() {
        let err = parse_incidents(r#"[{"id": "P1", "status": "resolved"}]"#).unwrap_err();
        assert!(matches!(err, SourceError::Incident(_)));
    }

    #[tokio::test]
    async fn file_source_applies_window() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("incidents.json");
        std::fs::write(&path, BATCH).unwrap();
        let window = TimeWindow::new(
            instant("2015-01-02T00:00:00Z"),
            instant("2015-01-04T00:00:00Z"),
        )
        .unwrap();
        let incidents = JsonFileSource::new(&path).fetch(&window, None).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].id, "P2");
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let window = TimeWindow::new(
            instant("2015-01-02T00:00:00Z"),
            instant("2015-01-04T00:00:00Z"),
        )
        .unwrap();
        let err = JsonFileSource::new("/nonexistent/incidents.json")
            .fetch(&window, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/incidents.json"));
    }
}
