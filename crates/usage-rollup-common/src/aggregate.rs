use crate::types::{AppMinutes, DailyUsageRecord};
use crate::week_window::WeekWindow;

/// Sum daily minutes per package over the records that fall inside `window`.
///
/// Records outside the window or without a package name contribute nothing.
/// The result is empty exactly when no record qualifies; a package with
/// only zero-minute days still appears with a total of zero.
pub fn aggregate_records<'a, I>(records: I, window: &WeekWindow) -> AppMinutes
where
    I: IntoIterator<Item = &'a DailyUsageRecord>,
{
    let mut totals = AppMinutes::new();

    for record in records {
        if !window.contains(record.date) {
            continue;
        }
        let Some(package) = record.package() else {
            continue;
        };
        let entry = totals.entry(package.to_string()).or_insert(0);
        *entry = entry.saturating_add(record.minutes);
    }

    totals
}
