use clap::Args;
use pdstats_core::WindowRequest;

/// Report period flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Start of the report period, local time, year first (e.g. "2015-03-01 08:00")
    #[arg(long, value_name = "DATETIME")]
    pub start: Option<String>,
    /// End of the report period, local time; requires --start
    #[arg(long, value_name = "DATETIME", requires = "start")]
    pub end: Option<String>,
    /// Report on the previous N minutes instead of explicit bounds
    #[arg(long, value_name = "MINUTES", conflicts_with_all = ["start", "end"])]
    pub last: Option<u32>,
}

impl From<&WindowArgs> for WindowRequest {
    fn from(args: &WindowArgs) -> Self {
        WindowRequest {
            start: args.start.clone(),
            end: args.end.clone(),
            last_minutes: args.last,
        }
    }
}
