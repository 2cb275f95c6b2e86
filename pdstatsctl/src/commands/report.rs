use clap::Args;

use super::window::WindowArgs;

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Escalation policy id; defaults to pagerduty.policy from the config
    #[arg(value_name = "POLICY")]
    pub policy: Option<String>,
    /// Rank the N most frequent alarms instead of listing incidents
    #[arg(long, value_name = "N", value_parser = parse_top_count)]
    pub top: Option<usize>,
    /// Drop incidents created on the excluded weekday (Thursday by default)
    #[arg(long = "no-thurs")]
    pub no_thurs: bool,
    /// Build the HTML ranking report and mail it to the configured recipients
    #[arg(long)]
    pub email: bool,
    /// With --email, build the report without running the mail command
    #[arg(long = "dry-run", requires = "email")]
    pub dry_run: bool,
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MtrArgs {
    /// Escalation policy id; defaults to pagerduty.policy from the config
    #[arg(value_name = "POLICY")]
    pub policy: Option<String>,
    #[command(flatten)]
    pub window: WindowArgs,
}

fn parse_top_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("top count must be at least 1".to_string()),
        Ok(count) => Ok(count),
        Err(err) => Err(format!("invalid top count: {err}")),
    }
}
