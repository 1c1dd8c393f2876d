//! In-memory store with failure injection for unit tests.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use usage_rollup_common::{
    AppMinutes, ConsistencyMode, DailyUsageRecord, Provenance, SummaryWrite, UserId, WeekWindow,
    WeeklySummary,
};
use usage_rollup_db::{DbError, Result, UsageStore, WriteOutcome};

use crate::batch::BatchFailureIsolator;
use crate::summary_writer::SummaryWriter;
use crate::triggers::TriggerLayer;

pub const ADMIN_SECRET: &str = "operator-secret";

pub fn apps(entries: &[(&str, u64)]) -> AppMinutes {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Trigger layer over `store` with [`ADMIN_SECRET`] as the operator secret.
pub fn trigger_layer<S: UsageStore + 'static>(store: S) -> TriggerLayer {
    trigger_layer_shared(Arc::new(store))
}

pub fn trigger_layer_shared(store: Arc<dyn UsageStore>) -> TriggerLayer {
    let writer = SummaryWriter::new(Arc::clone(&store), ConsistencyMode::LastWriteWins);
    let batch = BatchFailureIsolator::new(Arc::clone(&store), writer.clone());
    TriggerLayer::new(store, writer, batch, Some(ADMIN_SECRET.to_string().into()))
}

#[derive(Default)]
struct State {
    users: BTreeSet<UserId>,
    rows: Vec<DailyUsageRecord>,
    summaries: HashMap<(UserId, NaiveDate), WeeklySummary>,
    writes: usize,
    reads: usize,
    failing_reads: HashSet<UserId>,
    failing_writes: HashSet<UserId>,
    slow_reads: HashMap<UserId, Duration>,
    listing_fails: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn register(&self, user: &UserId) {
        self.with_state(|s| s.users.insert(user.clone()));
    }

    /// Adds rows and registers their users.
    pub fn add_rows(&self, rows: &[DailyUsageRecord]) {
        self.with_state(|s| {
            for row in rows {
                s.users.insert(row.user_id.clone());
                s.rows.push(row.clone());
            }
        });
    }

    pub fn put_summary(
        &self,
        user: &UserId,
        week: WeekWindow,
        apps: AppMinutes,
        pushed_by: Provenance,
    ) {
        let now = Utc::now();
        let summary =
            WeeklySummary { week_start: week.start(), generated_at: now, apps, pushed_by, pushed_at: now };
        self.with_state(|s| s.summaries.insert((user.clone(), week.start()), summary));
    }

    pub fn summary(&self, user: &UserId, week_start: NaiveDate) -> Option<WeeklySummary> {
        self.with_state(|s| s.summaries.get(&(user.clone(), week_start)).cloned())
    }

    pub fn users(&self) -> Vec<UserId> {
        self.with_state(|s| s.users.iter().cloned().collect())
    }

    pub fn rows(&self) -> Vec<DailyUsageRecord> {
        self.with_state(|s| s.rows.clone())
    }

    pub fn write_count(&self) -> usize {
        self.with_state(|s| s.writes)
    }

    /// Number of store calls of any kind, used to prove rejected requests touch nothing.
    pub fn access_count(&self) -> usize {
        self.with_state(|s| s.writes + s.reads)
    }

    pub fn fail_reads_for(&self, user: &str) {
        self.with_state(|s| s.failing_reads.insert(UserId::from(user)));
    }

    pub fn fail_writes_for(&self, user: &str) {
        self.with_state(|s| s.failing_writes.insert(UserId::from(user)));
    }

    pub fn delay_reads_for(&self, user: &str, delay: Duration) {
        self.with_state(|s| s.slow_reads.insert(UserId::from(user), delay));
    }

    pub fn fail_listing(&self) {
        self.with_state(|s| s.listing_fails = true);
    }

    fn upsert(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
        merge: bool,
    ) -> Result<WriteOutcome> {
        self.with_state(|s| {
            if s.failing_writes.contains(user) {
                return Err(DbError::InvalidData(format!("injected write failure for {}", user)));
            }

            let key = (user.clone(), write.week.start());
            let existing = s.summaries.get(&key);

            if mode == ConsistencyMode::PushedAtGuard
                && existing.is_some_and(|stored| stored.pushed_at > write.pushed_at)
            {
                return Ok(WriteOutcome::Stale);
            }

            let apps = match (merge, existing) {
                (true, Some(stored)) => {
                    let mut apps: BTreeMap<_, _> = stored.apps.clone();
                    apps.extend(write.apps.clone());
                    apps
                }
                _ => write.apps.clone(),
            };

            let summary = WeeklySummary { apps, ..write.clone().into_summary() };
            s.summaries.insert(key, summary);
            s.writes += 1;
            Ok(WriteOutcome::Applied)
        })
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn list_users(&self) -> Result<Vec<UserId>> {
        self.with_state(|s| {
            s.reads += 1;
            if s.listing_fails {
                let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline");
                return Err(DbError::Io(io));
            }
            Ok(s.users.iter().cloned().collect())
        })
    }

    async fn daily_records(&self, user: &UserId, window: &WeekWindow) -> Result<Vec<DailyUsageRecord>> {
        let delay = self.with_state(|s| s.slow_reads.get(user).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|s| {
            s.reads += 1;
            if s.failing_reads.contains(user) {
                return Err(DbError::InvalidData(format!("injected read failure for {}", user)));
            }
            Ok(s
                .rows
                .iter()
                .filter(|r| &r.user_id == user && window.contains(r.date))
                .cloned()
                .collect())
        })
    }

    async fn replace_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        self.upsert(user, write, mode, false)
    }

    async fn merge_summary(
        &self,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        self.upsert(user, write, mode, true)
    }

    async fn register_user(&self, user: &UserId) -> Result<bool> {
        Ok(self.with_state(|s| {
            s.writes += 1;
            s.users.insert(user.clone())
        }))
    }

    async fn record_daily_usage(&self, records: &[DailyUsageRecord]) -> Result<usize> {
        self.with_state(|s| {
            s.writes += 1;
            for record in records {
                s.rows.retain(|r| {
                    !(r.user_id == record.user_id
                        && r.date == record.date
                        && r.package_name == record.package_name)
                });
                s.rows.push(record.clone());
            }
        });
        Ok(records.len())
    }

    async fn weekly_summary(&self, user: &UserId, week_start: NaiveDate) -> Result<Option<WeeklySummary>> {
        Ok(self.summary(user, week_start))
    }

    async fn ping(&self) -> Result<()> {
        self.with_state(|s| {
            if s.listing_fails {
                let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline");
                return Err(DbError::Io(io));
            }
            Ok(())
        })
    }
}
