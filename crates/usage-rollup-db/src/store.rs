use async_trait::async_trait;
use chrono::NaiveDate;
use usage_rollup_common::{ConsistencyMode, DailyUsageRecord, SummaryWrite, UserId, WeekWindow, WeeklySummary};

use crate::connection::Database;
use crate::error::Result;
use crate::queries::{DailyUsageQueries, UserQueries, WeeklySummaryQueries, WriteOutcome};

/// Record store seen by the aggregation service.
///
/// Implemented by [`Database`]; tests wrap it to inject failures.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserId>>;

    async fn daily_records(&self, user: &UserId, window: &WeekWindow) -> Result<Vec<DailyUsageRecord>>;

    async fn replace_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome>;

    async fn merge_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome>;

    /// Returns true when the user was not known before.
    async fn register_user(&self, user: &UserId) -> Result<bool>;

    async fn record_daily_usage(&self, records: &[DailyUsageRecord]) -> Result<usize>;

    async fn weekly_summary(&self, user: &UserId, week_start: NaiveDate) -> Result<Option<WeeklySummary>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl UsageStore for Database {
    async fn list_users(&self) -> Result<Vec<UserId>> {
        UserQueries::list_ids(self).await
    }

    async fn daily_records(&self, user: &UserId, window: &WeekWindow) -> Result<Vec<DailyUsageRecord>> {
        DailyUsageQueries::list_for_window(self, user, window).await
    }

    async fn replace_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        WeeklySummaryQueries::replace(self, user, write, mode).await
    }

    async fn merge_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        WeeklySummaryQueries::merge(self, user, write, mode).await
    }

    async fn register_user(&self, user: &UserId) -> Result<bool> {
        UserQueries::ensure(self, user).await
    }

    async fn record_daily_usage(&self, records: &[DailyUsageRecord]) -> Result<usize> {
        DailyUsageQueries::record_many(self, records).await
    }

    async fn weekly_summary(&self, user: &UserId, week_start: NaiveDate) -> Result<Option<WeeklySummary>> {
        WeeklySummaryQueries::get(self, user, week_start).await
    }

    async fn ping(&self) -> Result<()> {
        Database::ping(self).await
    }
}
