use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::triggers::TriggerLayer;

/// A fixed weekly firing time in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    weekday: Weekday,
    time: NaiveTime,
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self { weekday: Weekday::Mon, time: NaiveTime::default() + ChronoDuration::hours(3) }
    }
}

impl WeeklySchedule {
    /// `None` when hour or minute is out of range.
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { weekday, time })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

/// First firing strictly after `now`.
pub fn next_fire_after(now: DateTime<Utc>, schedule: &WeeklySchedule) -> DateTime<Utc> {
    let today = now.date_naive();
    let days_ahead = (schedule.weekday.num_days_from_monday() + 7
        - today.weekday().num_days_from_monday())
        % 7;

    let candidate =
        (today + ChronoDuration::days(days_ahead as i64)).and_time(schedule.time).and_utc();

    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::weeks(1)
    }
}

/// Next firing after `now`, never at or before `last_fired`.
///
/// Keeps a backwards wall-clock step from firing the same slot twice.
pub fn next_fire_since(
    now: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
    schedule: &WeeklySchedule,
) -> DateTime<Utc> {
    let floor = last_fired.map_or(now, |fired| now.max(fired));
    next_fire_after(floor, schedule)
}

/// Runs the scheduled aggregation on a weekly cadence until shut down.
pub struct WeeklyScheduler {
    triggers: Arc<TriggerLayer>,
    schedule: WeeklySchedule,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WeeklyScheduler {
    pub fn new(triggers: Arc<TriggerLayer>, schedule: WeeklySchedule) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { triggers, schedule, shutdown_tx, handle: Mutex::new(None) }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("Weekly scheduler already running");
            return;
        }

        let triggers = Arc::clone(&self.triggers);
        let schedule = self.schedule;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            let mut last_fired = None;
            loop {
                let now = Utc::now();
                let next = next_fire_since(now, last_fired, &schedule);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                info!(next_fire = %next, "Next weekly aggregation scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        last_fired = Some(next);
                        match triggers.scheduled_run(next).await {
                            Ok(report) => info!(
                                run_id = %report.run_id,
                                week_start = %report.window.start(),
                                written = report.written,
                                skipped = report.skipped,
                                failed = report.failures.len(),
                                truncated = report.truncated,
                                "Scheduled aggregation finished"
                            ),
                            Err(e) => error!(
                                error = %e,
                                "Scheduled aggregation failed, waiting for next firing or a manual trigger"
                            ),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutting down weekly scheduler");
                        break;
                    }
                }
            }
        }));

        info!(
            weekday = ?self.schedule.weekday(),
            time = %self.schedule.time(),
            "Weekly scheduler started"
        );
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Weekly scheduler task ended abnormally");
            }
        }
    }
}
