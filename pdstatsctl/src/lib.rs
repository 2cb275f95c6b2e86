pub mod commands;
pub mod email;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pdstats_core::source::pagerduty::ENV_API_TOKEN;
use pdstats_core::{
    exclude_weekday, load_stats_config, segregate, ClassificationRules, FilterPipeline, Incident,
    IncidentCommand, IncidentSource, JsonFileSource, MtrSummary, PagerDutyClient, Ranking,
    RankingEntry, SourceError, StatsConfig, StatsError, TimeWindow, WindowRequest,
};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::commands::{MtrArgs, ReportArgs, WindowArgs};
use crate::email::{build_html_report, EmailDispatcher, EmailError, EmailOutcome};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] pdstats_core::ConfigError),
    #[error("{0}")]
    Stats(#[from] StatsError),
    #[error("incident source error: {0}")]
    Source(#[from] SourceError),
    #[error("email error: {0}")]
    Email(#[from] EmailError),
    #[error("runtime error: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no escalation policy given and pagerduty.policy is not configured")]
    MissingPolicy,
    #[error("no PagerDuty API token: pass --token, set {} or pagerduty.api_token", ENV_API_TOKEN)]
    MissingToken,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "PagerDuty incident statistics", long_about = None)]
pub struct Cli {
    /// Path to pdstats.toml; built-in defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// PagerDuty API token (overrides PAGERDUTY_API_TOKEN and pagerduty.api_token)
    #[arg(long)]
    pub token: Option<String>,
    /// Read incidents from a JSON export instead of the PagerDuty API
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Every incident of the escalation policy
    All(ReportArgs),
    /// Incidents created overnight
    Wakeups(ReportArgs),
    /// Resolved incidents that cleared on their own within minutes
    Flakes(ReportArgs),
    /// Mean time to resolution, in seconds
    Mtr(MtrArgs),
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "pdstatsctl", &mut std::io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::All(args) => {
            let report = context.incident_report(IncidentCommand::All, args)?;
            render(&report, cli.format)?;
        }
        Commands::Wakeups(args) => {
            let report = context.incident_report(IncidentCommand::Wakeups, args)?;
            render(&report, cli.format)?;
        }
        Commands::Flakes(args) => {
            let report = context.incident_report(IncidentCommand::Flakes, args)?;
            render(&report, cli.format)?;
        }
        Commands::Mtr(args) => {
            let report = context.mtr(args)?;
            render(&report, cli.format)?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

struct AppContext {
    config: StatsConfig,
    source: Box<dyn IncidentSource>,
    runtime: tokio::runtime::Runtime,
    now: DateTime<Utc>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_stats_config(path)?,
            None => StatsConfig::default(),
        };

        let source: Box<dyn IncidentSource> = match &cli.input {
            Some(path) => Box::new(JsonFileSource::new(path)),
            None => {
                let token = cli
                    .token
                    .clone()
                    .or_else(|| std::env::var(ENV_API_TOKEN).ok())
                    .or_else(|| config.pagerduty.api_token.clone())
                    .filter(|token| !token.is_empty())
                    .ok_or(AppError::MissingToken)?;
                Box::new(PagerDutyClient::from_config(&config.pagerduty, token)?)
            }
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(AppError::Runtime)?;

        Ok(Self {
            config,
            source,
            runtime,
            now: Utc::now(),
        })
    }

    fn zone(&self) -> Tz {
        self.config.analysis.timezone
    }

    fn policy(&self, given: Option<&str>) -> Result<String> {
        given
            .map(str::to_string)
            .or_else(|| self.config.pagerduty.policy.clone())
            .ok_or(AppError::MissingPolicy)
    }

    fn resolve_window(&self, args: &WindowArgs) -> Result<TimeWindow> {
        let span = Duration::days(self.config.analysis.default_window_days);
        Ok(WindowRequest::from(args).resolve(self.now, self.zone(), span)?)
    }

    fn fetch(&self, window: &TimeWindow, log_entries_for: Option<&str>) -> Result<Vec<Incident>> {
        Ok(self
            .runtime
            .block_on(self.source.fetch(window, log_entries_for))?)
    }

    fn incident_report(&self, command: IncidentCommand, args: &ReportArgs) -> Result<IncidentReport> {
        let policy = self.policy(args.policy.as_deref())?;
        let window = self.resolve_window(&args.window)?;
        let log_entries_for = (command == IncidentCommand::Flakes).then_some(policy.as_str());
        let batch = self.fetch(&window, log_entries_for)?;

        let analysis = &self.config.analysis;
        let pipeline = FilterPipeline::new(policy.as_str(), ClassificationRules::from_analysis(analysis));
        let selected: Vec<&Incident> = if args.no_thurs {
            exclude_weekday(
                pipeline.select(command, &batch),
                analysis.excluded_weekday,
                analysis.timezone,
            )
            .collect()
        } else {
            pipeline.select(command, &batch).collect()
        };
        let split = segregate(selected, &analysis.staging_marker);
        tracing::debug!(
            %command,
            production = split.production.len(),
            staging = split.staging.len(),
            "segregated incidents"
        );

        let top_count = args.top.unwrap_or(analysis.top_count);
        let production_ranking = Ranking::top(split.production.iter().copied(), top_count);
        let staging_ranking = Ranking::top(split.staging.iter().copied(), top_count);

        let email = if args.email {
            let html = build_html_report(&production_ranking, &staging_ranking, self.zone());
            let subject = format!(
                "PagerDuty {command} report {} to {}",
                window.since_param(),
                window.until_param()
            );
            let outcome = EmailDispatcher::new(self.config.email.clone())
                .with_dry_run(args.dry_run)
                .deliver(&subject, &html)?;
            tracing::info!(subject = %outcome.subject, dispatch = ?outcome.dispatch, "email report");
            Some(outcome)
        } else {
            None
        };

        let rankings = (args.top.is_some() && !args.email).then(|| Rankings {
            production: production_ranking.entries.iter().map(RankedAlarm::from).collect(),
            staging: staging_ranking.entries.iter().map(RankedAlarm::from).collect(),
        });

        Ok(IncidentReport {
            command,
            policy,
            window,
            zone: self.zone(),
            production: split.production.into_iter().cloned().collect(),
            staging: split.staging.into_iter().cloned().collect(),
            rankings,
            email,
        })
    }

    fn mtr(&self, args: &MtrArgs) -> Result<MtrReport> {
        let policy = self.policy(args.policy.as_deref())?;
        let window = self.resolve_window(&args.window)?;
        let batch = self.fetch(&window, None)?;
        let pipeline = FilterPipeline::new(
            policy.as_str(),
            ClassificationRules::from_analysis(&self.config.analysis),
        );
        let summary = MtrSummary::from_resolved(pipeline.resolved(&batch));
        Ok(MtrReport {
            policy,
            window,
            summary,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct IncidentReport {
    pub command: IncidentCommand,
    pub policy: String,
    pub window: TimeWindow,
    #[serde(skip)]
    pub zone: Tz,
    pub production: Vec<Incident>,
    pub staging: Vec<Incident>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rankings: Option<Rankings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailOutcome>,
}

#[derive(Debug, Serialize)]
pub struct Rankings {
    pub production: Vec<RankedAlarm>,
    pub staging: Vec<RankedAlarm>,
}

#[derive(Debug, Serialize)]
pub struct RankedAlarm {
    pub description: String,
    pub count: usize,
    pub incidents: Vec<String>,
}

impl From<&RankingEntry<'_>> for RankedAlarm {
    fn from(entry: &RankingEntry<'_>) -> Self {
        Self {
            description: entry.description.clone(),
            count: entry.count,
            incidents: entry.incidents.iter().map(|i| i.id.clone()).collect(),
        }
    }
}

fn listing(incidents: &[Incident], zone: Tz) -> Vec<String> {
    let mut ordered: Vec<&Incident> = incidents.iter().collect();
    ordered.sort_by_key(|incident| incident.created_at);
    ordered
        .into_iter()
        .map(|incident| {
            format!(
                "{}\t{}\t{}",
                incident.id,
                incident.iso_local(zone),
                incident.description
            )
        })
        .collect()
}

impl DisplayFallback for IncidentReport {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        if let Some(rankings) = &self.rankings {
            for alarm in rankings.production.iter().chain(rankings.staging.iter()) {
                lines.push(format!("{}\t{}", alarm.count, alarm.description));
            }
        } else if self.email.is_some() {
            lines.push("Report-1: Statistics for Production Servers".to_string());
            lines.extend(listing(&self.production, self.zone));
            lines.push(String::new());
            lines.push("Report-2: Statistics for Staging Servers".to_string());
            lines.extend(listing(&self.staging, self.zone));
        } else {
            lines.extend(listing(&self.production, self.zone));
            lines.extend(listing(&self.staging, self.zone));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct MtrReport {
    pub policy: String,
    pub window: TimeWindow,
    #[serde(flatten)]
    pub summary: MtrSummary,
}

impl DisplayFallback for MtrReport {
    fn display(&self) -> String {
        self.summary.mean_seconds.to_string()
    }
}
