use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::week_window::WeekWindow;

/// Minutes spent per application, keyed by package name.
///
/// Ordered so that stored and transmitted summaries serialize identically
/// for identical contents.
pub type AppMinutes = BTreeMap<String, u64>;

/// Identity of an end user as resolved from a device credential.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which producer last wrote a weekly summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Pre-aggregated payload pushed by a client device
    Device,
    /// Recurring weekly server aggregation
    ServerCron,
    /// Operator-initiated server aggregation
    ServerManual,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Device => "device",
            Provenance::ServerCron => "server_cron",
            Provenance::ServerManual => "server_manual",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" => Ok(Provenance::Device),
            "server_cron" => Ok(Provenance::ServerCron),
            "server_manual" => Ok(Provenance::ServerManual),
            other => Err(format!("unknown provenance tag: {}", other)),
        }
    }
}

/// A single day of usage for one application, as recorded by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsageRecord {
    pub user_id: UserId,
    pub date: NaiveDate,
    /// Rows without a package name are kept by the store but never aggregated
    pub package_name: Option<String>,
    pub minutes: u64,
}

impl DailyUsageRecord {
    pub fn new(user_id: UserId, date: NaiveDate, package_name: &str, minutes: u64) -> Self {
        Self { user_id, date, package_name: Some(package_name.to_string()), minutes }
    }

    /// Package name if present and non-empty.
    pub fn package(&self) -> Option<&str> {
        self.package_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Canonical per-user, per-week record of minutes spent per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub apps: AppMinutes,
    pub pushed_by: Provenance,
    pub pushed_at: DateTime<Utc>,
}

/// Fields carried by a single summary write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWrite {
    pub week: WeekWindow,
    pub generated_at: DateTime<Utc>,
    pub apps: AppMinutes,
    pub pushed_by: Provenance,
    pub pushed_at: DateTime<Utc>,
}

impl SummaryWrite {
    pub fn into_summary(self) -> WeeklySummary {
        WeeklySummary {
            week_start: self.week.start(),
            generated_at: self.generated_at,
            apps: self.apps,
            pushed_by: self.pushed_by,
            pushed_at: self.pushed_at,
        }
    }
}
