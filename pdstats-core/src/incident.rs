use std::fmt;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{StatsError, StatsResult};
use crate::window::to_local;

const LOG_ENTRY_SUFFIX: &str = "_log_entry";
const ACKNOWLEDGE: &str = "acknowledge";
const HUMAN_ACTOR_TYPES: &[&str] = &["user", "user_reference"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentStatus {
    Triggered,
    Acknowledged,
    Resolved,
    Other(String),
}

impl IncidentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "triggered" => Self::Triggered,
            "acknowledged" => Self::Acknowledged,
            "resolved" => Self::Resolved,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentStatus::Triggered => write!(f, "triggered"),
            IncidentStatus::Acknowledged => write!(f, "acknowledged"),
            IncidentStatus::Resolved => write!(f, "resolved"),
            IncidentStatus::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for IncidentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Human who changed an incident's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Event kind with any `_log_entry` suffix removed, e.g. `acknowledge`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn new(kind: &str, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: kind.strip_suffix(LOG_ENTRY_SUFFIX).unwrap_or(kind).to_string(),
            created_at,
        }
    }

    pub fn is_acknowledgement(&self) -> bool {
        self.kind == ACKNOWLEDGE
    }
}

/// Normalized, read-only view of one fetched incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_number: Option<u64>,
    pub description: String,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub last_status_change_at: DateTime<Utc>,
    pub escalation_policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_change_by: Option<Actor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_entries: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl Incident {
    pub fn is_resolved(&self) -> bool {
        self.status == IncidentStatus::Resolved
    }

    pub fn was_acknowledged(&self) -> bool {
        self.log_entries.iter().any(LogEntry::is_acknowledgement)
    }

    pub fn time_to_resolution(&self) -> Duration {
        self.last_status_change_at - self.created_at
    }

    pub fn created_local(&self, zone: Tz) -> DateTime<Tz> {
        to_local(self.created_at, zone)
    }

    pub fn last_status_change_local(&self, zone: Tz) -> DateTime<Tz> {
        to_local(self.last_status_change_at, zone)
    }

    pub fn iso_local(&self, zone: Tz) -> String {
        self.created_local(zone).to_rfc3339()
    }

    pub fn friendly_local(&self, zone: Tz) -> String {
        self.created_local(zone).format("%m-%d %H:%M:%S").to_string()
    }

    /// HTML anchor pointing at the incident page.
    pub fn link(&self) -> String {
        let label = self
            .incident_number
            .map(|number| number.to_string())
            .unwrap_or_else(|| self.id.clone());
        let label = escape_html(&label);
        match &self.html_url {
            Some(url) => format!("<a href='{}'>#{label}</a>", escape_html(url)),
            None => format!("#{label}"),
        }
    }
}

/// Escapes text for HTML element content and quoted attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReference {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLogEntry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_at: Option<String>,
}

/// Incident as delivered by the REST API. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIncident {
    pub id: Option<String>,
    pub incident_number: Option<u64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub last_status_change_at: Option<String>,
    pub escalation_policy: Option<RawReference>,
    pub last_status_change_by: Option<RawReference>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub log_entries: Vec<RawLogEntry>,
}

impl RawIncident {
    /// Title, then long description, then empty.
    pub fn resolved_description(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_default()
    }
}

impl TryFrom<RawIncident> for Incident {
    type Error = StatsError;

    fn try_from(raw: RawIncident) -> StatsResult<Self> {
        let id = raw
            .id
            .clone()
            .ok_or_else(|| StatsError::malformed_incident(None, "missing id"))?;
        let description = raw.resolved_description();
        let status = raw
            .status
            .as_deref()
            .map(IncidentStatus::parse)
            .ok_or_else(|| StatsError::malformed_incident(Some(&id), "missing status"))?;
        let created_at = required_instant(&id, "created_at", raw.created_at.as_deref())?;
        let last_status_change_at = required_instant(
            &id,
            "last_status_change_at",
            raw.last_status_change_at.as_deref(),
        )?;
        let escalation_policy_id = raw
            .escalation_policy
            .and_then(|policy| policy.id)
            .ok_or_else(|| StatsError::malformed_incident(Some(&id), "missing escalation_policy"))?;
        let last_status_change_by = raw.last_status_change_by.and_then(human_actor);
        let log_entries = raw
            .log_entries
            .into_iter()
            .map(|entry| {
                let kind = entry.kind.ok_or_else(|| {
                    StatsError::malformed_incident(Some(&id), "log entry without type")
                })?;
                let created_at = entry
                    .created_at
                    .as_deref()
                    .map(|value| parse_instant(&id, "log_entries.created_at", value))
                    .transpose()?;
                Ok(LogEntry::new(&kind, created_at))
            })
            .collect::<StatsResult<Vec<_>>>()?;

        Ok(Incident {
            id,
            incident_number: raw.incident_number,
            description,
            status,
            created_at,
            last_status_change_at,
            escalation_policy_id,
            last_status_change_by,
            log_entries,
            html_url: raw.html_url,
        })
    }
}

fn human_actor(reference: RawReference) -> Option<Actor> {
    let is_human = reference
        .kind
        .as_deref()
        .map_or(true, |kind| HUMAN_ACTOR_TYPES.contains(&kind));
    match (is_human, reference.id) {
        (true, Some(id)) => Some(Actor {
            id,
            summary: reference.summary,
        }),
        _ => None,
    }
}

fn required_instant(id: &str, field: &str, value: Option<&str>) -> StatsResult<DateTime<Utc>> {
    let value =
        value.ok_or_else(|| StatsError::malformed_incident(Some(id), format!("missing {field}")))?;
    parse_instant(id, field, value)
}

fn parse_instant(id: &str, field: &str, value: &str) -> StatsResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| StatsError::malformed_incident(Some(id), format!("{field} {value:?}: {err}")))
}
