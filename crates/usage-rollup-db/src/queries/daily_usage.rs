use crate::connection::Database;
use crate::error::{DbError, Result};
use chrono::NaiveDate;
use usage_rollup_common::{DailyUsageRecord, UserId, WeekWindow};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DbDailyUsage {
    pub user_id: String,
    pub date: NaiveDate,
    pub package_name: String, // empty when not reported
    pub minutes: i64,
}

impl TryFrom<DbDailyUsage> for DailyUsageRecord {
    type Error = DbError;

    fn try_from(row: DbDailyUsage) -> Result<Self> {
        let minutes = u64::try_from(row.minutes).map_err(|_| {
            DbError::InvalidData(format!(
                "negative minutes for {} on {}: {}",
                row.user_id, row.date, row.minutes
            ))
        })?;

        Ok(DailyUsageRecord {
            user_id: UserId::from(row.user_id),
            date: row.date,
            package_name: Some(row.package_name).filter(|name| !name.is_empty()),
            minutes,
        })
    }
}

const UPSERT_DAILY_USAGE: &str = r#"
    INSERT INTO daily_usage (user_id, date, package_name, minutes)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(user_id, date, package_name) DO UPDATE SET
        minutes = excluded.minutes,
        recorded_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
"#;

pub struct DailyUsageQueries;

impl DailyUsageQueries {
    /// Store one day of usage for one package, replacing any earlier upload of the same day.
    pub async fn record(db: &Database, record: &DailyUsageRecord) -> Result<()> {
        Self::record_many(db, std::slice::from_ref(record)).await.map(|_| ())
    }

    /// Store a batch of rows in one transaction.
    pub async fn record_many(db: &Database, records: &[DailyUsageRecord]) -> Result<usize> {
        let pool = db.pool()?;
        let mut tx = pool.begin().await?;

        for record in records {
            let minutes = i64::try_from(record.minutes).map_err(|_| {
                DbError::InvalidData(format!("minutes out of range: {}", record.minutes))
            })?;

            sqlx::query(UPSERT_DAILY_USAGE)
                .bind(record.user_id.as_str())
                .bind(record.date)
                .bind(record.package_name.as_deref().unwrap_or(""))
                .bind(minutes)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    /// All rows for `user` dated inside the inclusive window.
    pub async fn list_for_window(
        db: &Database,
        user: &UserId,
        window: &WeekWindow,
    ) -> Result<Vec<DailyUsageRecord>> {
        let pool = db.pool()?;

        let rows = sqlx::query_as::<_, DbDailyUsage>(
            "SELECT user_id, date, package_name, minutes FROM daily_usage WHERE user_id = ? AND date >= ? AND date <= ? ORDER BY date ASC"
        )
        .bind(user.as_str())
        .bind(window.start())
        .bind(window.end())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(DailyUsageRecord::try_from).collect()
    }
}
