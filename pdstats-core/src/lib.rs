pub mod config;
pub mod error;
pub mod filter;
pub mod incident;
pub mod mtr;
pub mod ranking;
pub mod segregate;
pub mod source;
pub mod window;

pub use config::{
    load_stats_config, AnalysisSection, EmailSection, PagerDutySection, StatsConfig,
    DEFAULT_TOP_COUNT,
};
pub use error::{ConfigError, Result, StatsError, StatsResult};
pub use filter::{exclude_weekday, ClassificationRules, FilterPipeline, IncidentCommand};
pub use incident::{escape_html, Actor, Incident, IncidentStatus, LogEntry, RawIncident};
pub use mtr::{mean_time_to_resolution, MtrSummary};
pub use ranking::{Ranking, RankingEntry};
pub use segregate::{segregate, Segregation};
pub use source::{IncidentSource, JsonFileSource, PagerDutyClient, SourceError};
pub use window::{local_to_utc, TimeWindow, WindowRequest};
