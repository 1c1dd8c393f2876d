// Week Window Module
//
// Resolves the Monday-aligned, seven-day window that weekly summaries are
// keyed on. All arithmetic happens on UTC calendar dates so runs scheduled
// near midnight land on the same window regardless of host time zone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive `[start, end]` date range of one calendar week, Monday to Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "NaiveDate", into = "NaiveDate")]
pub struct WeekWindow {
    start: NaiveDate,
}

impl WeekWindow {
    /// Window beginning at `start`, which must be a Monday.
    pub fn starting(start: NaiveDate) -> Result<Self, NotMonday> {
        if start.weekday() != Weekday::Mon {
            return Err(NotMonday(start));
        }
        Ok(Self { start })
    }

    /// Window of the calendar week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self { start: monday_of(date) }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(6)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }

    pub fn previous(&self) -> Self {
        Self { start: self.start - Duration::days(7) }
    }

    /// The seven dates of the window in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..7).map(move |offset| start + Duration::days(offset))
    }
}

impl std::fmt::Display for WeekWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end())
    }
}

impl TryFrom<NaiveDate> for WeekWindow {
    type Error = NotMonday;

    fn try_from(value: NaiveDate) -> Result<Self, Self::Error> {
        Self::starting(value)
    }
}

impl From<WeekWindow> for NaiveDate {
    fn from(value: WeekWindow) -> Self {
        value.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("week start {0} is not a Monday")]
pub struct NotMonday(pub NaiveDate);

fn monday_of(date: NaiveDate) -> NaiveDate {
    // Sunday-based weekday shifted so Monday is 0
    let days_since_monday = (date.weekday().num_days_from_sunday() + 6) % 7;
    date - Duration::days(i64::from(days_since_monday))
}

/// The most recently completed week relative to `reference`.
///
/// The week that `reference` falls in is never returned, even when
/// `reference` is itself a Monday.
pub fn previous_week(reference: DateTime<Utc>) -> WeekWindow {
    WeekWindow::containing(reference.date_naive()).previous()
}

pub fn previous_week_now() -> WeekWindow {
    previous_week(Utc::now())
}
