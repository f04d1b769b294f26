mod activity_log;
mod report;

pub use activity_log::{ActivityEvent, ActivityLog};
pub use report::{summarize, ActivityReport, ZoneSummary};
