pub mod report;
pub mod window;

pub use report::{MtrArgs, ReportArgs};
pub use window::WindowArgs;
