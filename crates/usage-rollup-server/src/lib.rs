pub mod aggregator;
pub mod batch;
pub mod config;
pub mod http;
pub mod identity;
pub mod scheduler;
pub mod server;
pub mod summary_writer;
pub mod triggers;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::PerUserAggregator;
pub use batch::{BatchFailureIsolator, BatchReport, UserFailure};
pub use config::ServerConfig;
pub use identity::{HmacTokenVerifier, IdentityVerifier};
pub use scheduler::{next_fire_after, next_fire_since, WeeklySchedule, WeeklyScheduler};
pub use summary_writer::SummaryWriter;
pub use triggers::{DailyUsageUpload, DevicePush, PushAck, TriggerLayer};
