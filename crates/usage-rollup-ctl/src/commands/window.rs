use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use usage_rollup_common::{previous_week, previous_week_now, WeekWindow};

pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC3339 timestamp: {}", value))
}

pub fn resolve(at: Option<&str>) -> Result<WeekWindow> {
    match at {
        Some(value) => Ok(previous_week(parse_instant(value)?)),
        None => Ok(previous_week_now()),
    }
}

/// One line per day of the window, Monday first.
pub fn day_lines(window: &WeekWindow) -> Vec<String> {
    window.days().map(|day| day.format("%a %Y-%m-%d").to_string()).collect()
}

pub fn show(at: Option<&str>) -> Result<()> {
    let window = resolve(at)?;

    println!("Week start: {}", window.start());
    println!("Week end:   {}", window.end());
    for line in day_lines(&window) {
        println!("  {}", line);
    }
    Ok(())
}
