pub mod connection;
pub mod error;
pub mod migrations;
pub mod queries;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{DbError, Result};
pub use migrations::MigrationStatus;
pub use queries::WriteOutcome;
pub use store::UsageStore;
