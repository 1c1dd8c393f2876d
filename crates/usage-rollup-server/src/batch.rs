use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use usage_rollup_common::{Error, Provenance, Result, UserId, WeekWindow};
use usage_rollup_db::{UsageStore, WriteOutcome};
use uuid::Uuid;

use crate::aggregator::PerUserAggregator;
use crate::summary_writer::SummaryWriter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFailure {
    pub user_id: UserId,
    pub error: String,
}

/// Outcome of one batch invocation. Partial success is a normal result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: Uuid,
    pub provenance: Provenance,
    pub window: WeekWindow,
    pub users_total: usize,
    pub written: usize,
    /// Users with no qualifying rows; nothing was written for them.
    pub skipped: usize,
    /// Writes rejected because the stored summary was pushed later.
    pub stale: usize,
    pub failures: Vec<UserFailure>,
    /// The time budget ran out before every user finished.
    pub truncated: bool,
}

impl BatchReport {
    fn new(run_id: Uuid, provenance: Provenance, window: WeekWindow, users_total: usize) -> Self {
        Self {
            run_id,
            provenance,
            window,
            users_total,
            written: 0,
            skipped: 0,
            stale: 0,
            failures: Vec::new(),
            truncated: false,
        }
    }

    pub fn attempted(&self) -> usize {
        self.written + self.skipped + self.stale + self.failures.len()
    }

    /// Users not finished when the batch was truncated.
    pub fn unattempted(&self) -> usize {
        self.users_total.saturating_sub(self.attempted())
    }

    fn record(&mut self, user: UserId, result: Result<UserOutcome>) {
        match result {
            Ok(UserOutcome::Written) => self.written += 1,
            Ok(UserOutcome::Skipped) => self.skipped += 1,
            Ok(UserOutcome::Stale) => self.stale += 1,
            Err(e) => {
                error!(
                    run_id = %self.run_id,
                    user_id = %user,
                    week_start = %self.window.start(),
                    error = %e,
                    "Failed to aggregate user, continuing with remaining users"
                );
                self.failures.push(UserFailure { user_id: user, error: e.to_string() });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserOutcome {
    Written,
    Skipped,
    Stale,
}

/// Runs aggregation for every known user, isolating per-user failures.
#[derive(Clone)]
pub struct BatchFailureIsolator {
    store: Arc<dyn UsageStore>,
    aggregator: PerUserAggregator,
    writer: SummaryWriter,
    max_concurrency: usize,
    time_budget: Option<Duration>,
}

impl BatchFailureIsolator {
    pub fn new(store: Arc<dyn UsageStore>, writer: SummaryWriter) -> Self {
        Self {
            aggregator: PerUserAggregator::new(Arc::clone(&store)),
            store,
            writer,
            max_concurrency: 4,
            time_budget: None,
        }
    }

    /// Cap on users processed at once. Values below 1 are treated as 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_time_budget(mut self, time_budget: Option<Duration>) -> Self {
        self.time_budget = time_budget;
        self
    }

    /// Attempt every known user once. Only failing to list users fails the call.
    #[instrument(skip_all, fields(week_start = %window.start(), provenance = %provenance))]
    pub async fn run(&self, window: WeekWindow, provenance: Provenance) -> Result<BatchReport> {
        let users = self
            .store
            .list_users()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("cannot list users: {}", e)))?;

        let run_id = Uuid::new_v4();
        let mut report = BatchReport::new(run_id, provenance, window, users.len());
        info!(run_id = %run_id, users = users.len(), "Starting weekly aggregation batch");

        let mut outcomes = stream::iter(users)
            .map(|user| async move {
                let result = self.process_user(&user, &window, provenance).await;
                (user, result)
            })
            .buffer_unordered(self.max_concurrency);

        let deadline = self.time_budget.map(|budget| tokio::time::Instant::now() + budget);

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, outcomes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        report.truncated = true;
                        break;
                    }
                },
                None => outcomes.next().await,
            };

            let Some((user, result)) = next else {
                break;
            };
            report.record(user, result);
        }

        if report.truncated {
            warn!(
                run_id = %run_id,
                unattempted = report.unattempted(),
                "Batch time budget exhausted, remaining users were not processed"
            );
        }

        info!(
            run_id = %run_id,
            written = report.written,
            skipped = report.skipped,
            stale = report.stale,
            failed = report.failures.len(),
            truncated = report.truncated,
            "Weekly aggregation batch finished"
        );

        Ok(report)
    }

    async fn process_user(
        &self,
        user: &UserId,
        window: &WeekWindow,
        provenance: Provenance,
    ) -> Result<UserOutcome> {
        let apps = self.aggregator.aggregate(user, window).await?;
        if apps.is_empty() {
            return Ok(UserOutcome::Skipped);
        }

        match self.writer.merge(user, *window, apps, provenance).await? {
            WriteOutcome::Applied => Ok(UserOutcome::Written),
            WriteOutcome::Stale => Ok(UserOutcome::Stale),
        }
    }
}
