pub mod aggregate;
pub mod config;
pub mod error;
pub mod security;
pub mod types;
pub mod week_window;

pub use aggregate::aggregate_records;
pub use config::ConsistencyMode;
pub use error::{AuthError, Error, Result};
pub use types::*;
pub use week_window::{previous_week, previous_week_now, WeekWindow};
