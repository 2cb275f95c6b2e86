use std::path::{Path, PathBuf};

use chrono::Weekday;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.pagerduty.com";
pub const DEFAULT_TOP_COUNT: usize = 25;
pub const DEFAULT_STAGING_MARKER: &str = "staging";
pub const MAX_WINDOW_DAYS: i64 = 3660;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct StatsConfig {
    pub pagerduty: PagerDutySection,
    pub analysis: AnalysisSection,
    pub email: EmailSection,
}

impl StatsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.pagerduty.page_size) {
            return Err(ConfigError::Invalid {
                field: "pagerduty.page_size",
                reason: format!("{} is outside 1..=100", self.pagerduty.page_size),
            });
        }
        self.analysis.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PagerDutySection {
    pub base_url: String,
    pub api_token: Option<String>,
    pub policy: Option<String>,
    pub page_size: u32,
}

impl Default for PagerDutySection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            policy: None,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub timezone: Tz,
    pub top_count: usize,
    pub staging_marker: String,
    pub flake_threshold_minutes: i64,
    pub night_start_hour: u32,
    pub morning_end_hour: u32,
    pub excluded_weekday: Weekday,
    pub default_window_days: i64,
}

impl AnalysisSection {
    fn validate(&self) -> Result<()> {
        if self.top_count == 0 {
            return Err(ConfigError::Invalid {
                field: "analysis.top_count",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.staging_marker.is_empty() {
            return Err(ConfigError::Invalid {
                field: "analysis.staging_marker",
                reason: "must not be empty".to_string(),
            });
        }
        if self.flake_threshold_minutes <= 0 {
            return Err(ConfigError::Invalid {
                field: "analysis.flake_threshold_minutes",
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, hour) in [
            ("analysis.night_start_hour", self.night_start_hour),
            ("analysis.morning_end_hour", self.morning_end_hour),
        ] {
            if hour >= 24 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{hour} is not an hour of the day"),
                });
            }
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.default_window_days) {
            return Err(ConfigError::Invalid {
                field: "analysis.default_window_days",
                reason: format!(
                    "{} is outside 1..={MAX_WINDOW_DAYS}",
                    self.default_window_days
                ),
            });
        }
        Ok(())
    }
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Los_Angeles,
            top_count: DEFAULT_TOP_COUNT,
            staging_marker: DEFAULT_STAGING_MARKER.to_string(),
            flake_threshold_minutes: 10,
            night_start_hour: 23,
            morning_end_hour: 8,
            excluded_weekday: Weekday::Thu,
            default_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSection {
    pub command: String,
    pub args: Vec<String>,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub subject_prefix: Option<String>,
    pub html_path: Option<PathBuf>,
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            command: "sendmail".to_string(),
            args: Vec::new(),
            sender: None,
            recipients: Vec::new(),
            subject_prefix: None,
            html_path: None,
        }
    }
}

pub fn load_stats_config<P: AsRef<Path>>(path: P) -> Result<StatsConfig> {
    let config: StatsConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/pdstats.toml");
        let config = load_stats_config(path).expect("config should parse");
        assert_eq!(config.pagerduty.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.analysis.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(config.analysis.excluded_weekday, Weekday::Thu);
        assert_eq!(config.analysis.top_count, 25);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.toml");
        fs::write(&path, "").unwrap();
        let config = load_stats_config(&path).unwrap();
        assert_eq!(config.analysis.staging_marker, "staging");
        assert_eq!(config.analysis.flake_threshold_minutes, 10);
        assert_eq!(config.analysis.night_start_hour, 23);
        assert_eq!(config.analysis.morning_end_hour, 8);
        assert_eq!(config.email.command, "sendmail");
        assert!(config.email.args.is_empty());
        assert!(config.pagerduty.policy.is_none());
    }

    #[test]
    fn rejects_out_of_range_hour() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[analysis]\nnight_start_hour = 24\n").unwrap();
        let err = load_stats_config(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "analysis.night_start_hour",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unbounded_window_span() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("span.toml");
        fs::write(&path, "[analysis]\ndefault_window_days = 200000000\n").unwrap();
        assert!(matches!(
            load_stats_config(&path).unwrap_err(),
            ConfigError::Invalid {
                field: "analysis.default_window_days",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tz.toml");
        fs::write(&path, "[analysis]\ntimezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(
            load_stats_config(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_stats_config("/nonexistent/pdstats.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pdstats.toml"));
    }
}
