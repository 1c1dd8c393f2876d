pub mod daily_usage;
pub mod users;
pub mod weekly_summaries;

pub use daily_usage::DailyUsageQueries;
pub use users::UserQueries;
pub use weekly_summaries::{WeeklySummaryQueries, WriteOutcome};
