use std::sync::Arc;
use tracing::debug;
use usage_rollup_common::{aggregate_records, AppMinutes, Error, Result, UserId, WeekWindow};
use usage_rollup_db::{DbError, UsageStore};

/// Reduces one user's daily rows for a week into per-application totals.
#[derive(Clone)]
pub struct PerUserAggregator {
    store: Arc<dyn UsageStore>,
}

impl PerUserAggregator {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Read-only. An empty mapping means the user had no qualifying activity.
    pub async fn aggregate(&self, user: &UserId, window: &WeekWindow) -> Result<AppMinutes> {
        let records =
            self.store.daily_records(user, window).await.map_err(|e| read_failure(user, e))?;

        let apps = aggregate_records(&records, window);
        debug!(
            user_id = %user,
            week_start = %window.start(),
            rows = records.len(),
            apps = apps.len(),
            "Aggregated daily usage"
        );
        Ok(apps)
    }
}

pub(crate) fn read_failure(user: &UserId, err: DbError) -> Error {
    if err.is_unavailable() {
        Error::UpstreamUnavailable(err.to_string())
    } else {
        Error::StoreRead { user: user.clone(), source: Box::new(err) }
    }
}
