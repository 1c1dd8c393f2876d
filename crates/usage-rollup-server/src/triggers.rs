use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use usage_rollup_common::security::admin_secret_matches;
use usage_rollup_common::{
    previous_week, previous_week_now, AppMinutes, AuthError, DailyUsageRecord, Error,
    Provenance, Result, SummaryWrite, UserId, WeekWindow,
};
use usage_rollup_db::{UsageStore, WriteOutcome};

use crate::batch::{BatchFailureIsolator, BatchReport};
use crate::summary_writer::{write_failure, SummaryWriter};

/// Pre-aggregated weekly payload pushed by a device.
///
/// Fields are optional on the wire so that missing ones are reported as input errors.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePush {
    pub week_start: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub apps: Option<AppMinutes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAck {
    pub success: bool,
    pub week_start: NaiveDate,
    /// False when a newer stored summary made this push stale.
    pub applied: bool,
}

/// One uploaded day of usage for one application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageUpload {
    pub date: NaiveDate,
    #[serde(default)]
    pub package_name: Option<String>,
    pub minutes: u64,
}

/// Entry points that cause summaries to be written.
pub struct TriggerLayer {
    store: Arc<dyn UsageStore>,
    writer: SummaryWriter,
    batch: BatchFailureIsolator,
    admin_secret: Option<SecretString>,
}

impl TriggerLayer {
    pub fn new(
        store: Arc<dyn UsageStore>,
        writer: SummaryWriter,
        batch: BatchFailureIsolator,
        admin_secret: Option<SecretString>,
    ) -> Self {
        Self { store, writer, batch, admin_secret }
    }

    /// Replace-write a device's pre-aggregated week, registering the user on first contact.
    #[instrument(skip(self, push), fields(user_id = %user))]
    pub async fn device_push(&self, user: &UserId, push: DevicePush) -> Result<PushAck> {
        let week_start = push.week_start.ok_or_else(|| Error::input("weekStart is required"))?;
        let apps = push.apps.ok_or_else(|| Error::input("apps is required"))?;

        let date = NaiveDate::parse_from_str(week_start.trim(), "%Y-%m-%d").map_err(|_| {
            Error::input(format!("weekStart must be an ISO date (YYYY-MM-DD), got {:?}", week_start))
        })?;
        let week = WeekWindow::starting(date).map_err(|e| Error::input(e.to_string()))?;

        self.ensure_registered(user).await?;

        let now = Utc::now();
        let write = SummaryWrite {
            week,
            generated_at: push.generated_at.unwrap_or(now),
            apps,
            pushed_by: Provenance::Device,
            pushed_at: now,
        };
        let outcome = self.writer.replace(user, &write).await?;

        info!(week_start = %week.start(), apps = write.apps.len(), "Accepted device push");
        Ok(PushAck {
            success: true,
            week_start: week.start(),
            applied: outcome == WriteOutcome::Applied,
        })
    }

    /// Store raw daily rows uploaded by a device for later aggregation.
    #[instrument(skip(self, rows), fields(user_id = %user, row_count = rows.len()))]
    pub async fn upload_daily_usage(
        &self,
        user: &UserId,
        rows: Vec<DailyUsageUpload>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Err(Error::input("at least one daily usage row is required"));
        }

        self.ensure_registered(user).await?;

        let records: Vec<DailyUsageRecord> = rows
            .into_iter()
            .map(|row| DailyUsageRecord {
                user_id: user.clone(),
                date: row.date,
                package_name: row.package_name,
                minutes: row.minutes,
            })
            .collect();

        let stored =
            self.store.record_daily_usage(&records).await.map_err(|e| write_failure(user, e))?;
        info!(stored, "Recorded daily usage upload");
        Ok(stored)
    }

    /// Aggregate the week before `fired_at` for every known user, tagged `server_cron`.
    #[instrument(skip(self))]
    pub async fn scheduled_run(&self, fired_at: DateTime<Utc>) -> Result<BatchReport> {
        self.run_batch(previous_week(fired_at), Provenance::ServerCron).await
    }

    /// Operator-initiated run, tagged `server_manual`. `reference` defaults to now
    /// and selects the week before it, which allows backfilling older weeks.
    #[instrument(skip(self, secret))]
    pub async fn manual_run(
        &self,
        secret: Option<&str>,
        reference: Option<DateTime<Utc>>,
    ) -> Result<BatchReport> {
        self.authorize_operator(secret)?;

        let window = reference.map(previous_week).unwrap_or_else(previous_week_now);
        self.run_batch(window, Provenance::ServerManual).await
    }

    /// Reject before any store access when the operator secret is absent or wrong.
    pub fn authorize_operator(&self, secret: Option<&str>) -> Result<()> {
        if admin_secret_matches(self.admin_secret.as_ref(), secret) {
            Ok(())
        } else {
            warn!("Rejected manual trigger with missing or incorrect operator secret");
            Err(AuthError::Forbidden.into())
        }
    }

    async fn run_batch(&self, window: WeekWindow, provenance: Provenance) -> Result<BatchReport> {
        info!(week_start = %window.start(), week_end = %window.end(), %provenance, "Running weekly aggregation");
        self.batch.run(window, provenance).await
    }

    async fn ensure_registered(&self, user: &UserId) -> Result<()> {
        let created = self.store.register_user(user).await.map_err(|e| write_failure(user, e))?;
        if created {
            info!(user_id = %user, "Registered new user");
        }
        Ok(())
    }

    pub async fn store_healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}
