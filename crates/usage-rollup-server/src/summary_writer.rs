use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use usage_rollup_common::{
    AppMinutes, ConsistencyMode, Error, Provenance, Result, SummaryWrite, UserId, WeekWindow,
};
use usage_rollup_db::{DbError, UsageStore, WriteOutcome};

/// Applies replace-writes and merge-writes to weekly summaries.
///
/// Each call performs exactly one store write and never retries.
#[derive(Clone)]
pub struct SummaryWriter {
    store: Arc<dyn UsageStore>,
    mode: ConsistencyMode,
}

impl SummaryWriter {
    pub fn new(store: Arc<dyn UsageStore>, mode: ConsistencyMode) -> Self {
        Self { store, mode }
    }

    /// Overwrite the whole record with a device payload.
    pub async fn replace(&self, user: &UserId, write: &SummaryWrite) -> Result<WriteOutcome> {
        let outcome = self
            .store
            .replace_summary(user, write, self.mode)
            .await
            .map_err(|e| write_failure(user, e))?;

        log_outcome(user, write, outcome);
        Ok(outcome)
    }

    /// Overwrite only the keys present in `apps`, stamped now with `provenance`.
    pub async fn merge(
        &self,
        user: &UserId,
        week: WeekWindow,
        apps: AppMinutes,
        provenance: Provenance,
    ) -> Result<WriteOutcome> {
        let now = Utc::now();
        let write =
            SummaryWrite { week, generated_at: now, apps, pushed_by: provenance, pushed_at: now };

        let outcome = self
            .store
            .merge_summary(user, &write, self.mode)
            .await
            .map_err(|e| write_failure(user, e))?;

        log_outcome(user, &write, outcome);
        Ok(outcome)
    }
}

fn log_outcome(user: &UserId, write: &SummaryWrite, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Applied => debug!(
            user_id = %user,
            week_start = %write.week.start(),
            provenance = %write.pushed_by,
            apps = write.apps.len(),
            "Weekly summary written"
        ),
        WriteOutcome::Stale => warn!(
            user_id = %user,
            week_start = %write.week.start(),
            provenance = %write.pushed_by,
            "Stored summary is newer, write skipped"
        ),
    }
}

pub(crate) fn write_failure(user: &UserId, err: DbError) -> Error {
    if err.is_unavailable() {
        Error::UpstreamUnavailable(err.to_string())
    } else {
        Error::StoreWrite { user: user.clone(), source: Box::new(err) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn week() -> WeekWindow {
        WeekWindow::starting(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).unwrap()
    }

    fn apps(entries: &[(&str, u64)]) -> AppMinutes {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn device_write(entries: &[(&str, u64)]) -> SummaryWrite {
        let now = Utc::now();
        SummaryWrite {
            week: week(),
            generated_at: now,
            apps: apps(entries),
            pushed_by: Provenance::Device,
            pushed_at: now,
        }
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_for_identical_apps() {
        let store = Arc::new(MemoryStore::default());
        let writer = SummaryWriter::new(store.clone(), ConsistencyMode::LastWriteWins);
        let alice = UserId::from("alice");

        writer.merge(&alice, week(), apps(&[("A", 10)]), Provenance::ServerCron).await.unwrap();
        let first = store.summary(&alice, week().start()).unwrap();
        writer.merge(&alice, week(), apps(&[("A", 10)]), Provenance::ServerCron).await.unwrap();
        let second = store.summary(&alice, week().start()).unwrap();

        assert_eq!(first.apps, second.apps);
        assert_eq!(first.pushed_by, second.pushed_by);
        assert_eq!(first.week_start, second.week_start);
    }

    #[tokio::test]
    async fn test_merge_keeps_keys_replace_drops_them() {
        let store = Arc::new(MemoryStore::default());
        let writer = SummaryWriter::new(store.clone(), ConsistencyMode::LastWriteWins);
        let alice = UserId::from("alice");

        writer.replace(&alice, &device_write(&[("A", 10), ("B", 5)])).await.unwrap();
        writer.merge(&alice, week(), apps(&[("A", 12)]), Provenance::ServerManual).await.unwrap();
        assert_eq!(store.summary(&alice, week().start()).unwrap().apps, apps(&[("A", 12), ("B", 5)]));

        writer.replace(&alice, &device_write(&[("A", 12)])).await.unwrap();
        let stored = store.summary(&alice, week().start()).unwrap();
        assert_eq!(stored.apps, apps(&[("A", 12)]));
        assert_eq!(stored.pushed_by, Provenance::Device);
    }

    #[tokio::test]
    async fn test_guarded_writer_reports_stale() {
        let store = Arc::new(MemoryStore::default());
        let writer = SummaryWriter::new(store.clone(), ConsistencyMode::PushedAtGuard);
        let alice = UserId::from("alice");

        writer.merge(&alice, week(), apps(&[("A", 1)]), Provenance::ServerCron).await.unwrap();

        let mut late = device_write(&[("B", 2)]);
        late.pushed_at = late.pushed_at - Duration::hours(1);
        assert_eq!(writer.replace(&alice, &late).await.unwrap(), WriteOutcome::Stale);
        assert_eq!(store.summary(&alice, week().start()).unwrap().apps, apps(&[("A", 1)]));
    }

    #[tokio::test]
    async fn test_write_failure_is_attributed_to_user() {
        let store = MemoryStore::default();
        store.fail_writes_for("bob");
        let writer = SummaryWriter::new(Arc::new(store), ConsistencyMode::LastWriteWins);

        let err = writer
            .merge(&UserId::from("bob"), week(), apps(&[("A", 1)]), Provenance::ServerCron)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreWrite { .. }));
    }
}
