use crate::connection::Database;
use crate::error::{DbError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use usage_rollup_common::{AppMinutes, ConsistencyMode, SummaryWrite, UserId, WeeklySummary};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DbWeeklySummary {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub apps: String, // JSON object
    pub pushed_by: String,
    pub pushed_at: DateTime<Utc>,
}

impl TryFrom<DbWeeklySummary> for WeeklySummary {
    type Error = DbError;

    fn try_from(row: DbWeeklySummary) -> Result<Self> {
        let apps: AppMinutes = serde_json::from_str(&row.apps)?;
        let pushed_by = row.pushed_by.parse().map_err(DbError::InvalidData)?;

        Ok(WeeklySummary {
            week_start: row.week_start,
            generated_at: row.generated_at,
            apps,
            pushed_by,
            pushed_at: row.pushed_at,
        })
    }
}

/// Result of a summary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Skipped because the stored record was pushed later than this write.
    Stale,
}

/// Fields every write sets; the `apps` assignment is chosen per discipline.
const UPSERT_SUMMARY_HEAD: &str = r#"
    INSERT INTO weekly_summaries (user_id, week_start, generated_at, apps, pushed_by, pushed_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(user_id, week_start) DO UPDATE SET
        generated_at = excluded.generated_at,
        pushed_by = excluded.pushed_by,
        pushed_at = excluded.pushed_at,
"#;

const REPLACE_APPS: &str = "apps = excluded.apps";

// json_patch overwrites keys present in the patch and keeps every other key
const MERGE_APPS: &str = "apps = json_patch(weekly_summaries.apps, excluded.apps)";

const PUSHED_AT_GUARD: &str =
    " WHERE julianday(excluded.pushed_at) >= julianday(weekly_summaries.pushed_at)";

pub struct WeeklySummaryQueries;

impl WeeklySummaryQueries {
    /// Overwrite the whole record: `apps` becomes exactly the written mapping.
    pub async fn replace(
        db: &Database,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        Self::upsert(db, user, write, REPLACE_APPS, mode).await
    }

    /// Set the top-level fields and overwrite only the `apps` keys present in the write.
    /// Creates the record when none exists yet.
    pub async fn merge(
        db: &Database,
        user: &UserId,
        write: &SummaryWrite,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        Self::upsert(db, user, write, MERGE_APPS, mode).await
    }

    async fn upsert(
        db: &Database,
        user: &UserId,
        write: &SummaryWrite,
        apps_assignment: &str,
        mode: ConsistencyMode,
    ) -> Result<WriteOutcome> {
        let pool = db.pool()?;

        let guard = match mode {
            ConsistencyMode::LastWriteWins => "",
            ConsistencyMode::PushedAtGuard => PUSHED_AT_GUARD,
        };
        let statement = format!("{}{}{}", UPSERT_SUMMARY_HEAD, apps_assignment, guard);

        let result = sqlx::query(&statement)
            .bind(user.as_str())
            .bind(write.week.start())
            .bind(write.generated_at)
            .bind(serde_json::to_string(&write.apps)?)
            .bind(write.pushed_by.as_str())
            .bind(write.pushed_at)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(WriteOutcome::Stale)
        } else {
            Ok(WriteOutcome::Applied)
        }
    }

    pub async fn get(
        db: &Database,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklySummary>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbWeeklySummary>(
            "SELECT * FROM weekly_summaries WHERE user_id = ? AND week_start = ?",
        )
        .bind(user.as_str())
        .bind(week_start)
        .fetch_optional(pool)
        .await?
        .map(WeeklySummary::try_from)
        .transpose()
    }

    pub async fn get_required(
        db: &Database,
        user: &UserId,
        week_start: NaiveDate,
    ) -> Result<WeeklySummary> {
        Self::get(db, user, week_start).await?.ok_or_else(|| {
            DbError::NotFound(format!("Weekly summary for {} starting {} not found", user, week_start))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
    use crate::queries::users::UserQueries;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;
    use usage_rollup_common::{Provenance, WeekWindow};

    async fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let db = Database::new(DatabaseConfig::at(db_path.to_str().unwrap())).await.unwrap();
        db.run_migrations().await.unwrap();
        UserQueries::ensure(&db, &UserId::from("alice")).await.unwrap();
        (db, dir)
    }

    fn week() -> WeekWindow {
        WeekWindow::starting(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).unwrap()
    }

    fn apps(entries: &[(&str, u64)]) -> AppMinutes {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn write(entries: &[(&str, u64)], pushed_by: Provenance, at: DateTime<Utc>) -> SummaryWrite {
        SummaryWrite { week: week(), generated_at: at, apps: apps(entries), pushed_by, pushed_at: at }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 22, 3, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_merge_creates_missing_record() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");

        let outcome = WeeklySummaryQueries::merge(
            &db,
            &alice,
            &write(&[("A", 10)], Provenance::ServerCron, t0()),
            ConsistencyMode::LastWriteWins,
        )
        .await
        .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        let stored = WeeklySummaryQueries::get_required(&db, &alice, week().start()).await.unwrap();
        assert_eq!(stored.apps, apps(&[("A", 10)]));
        assert_eq!(stored.pushed_by, Provenance::ServerCron);
        assert_eq!(stored.pushed_at, t0());
    }

    #[tokio::test]
    async fn test_merge_preserves_absent_keys() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");
        let mode = ConsistencyMode::LastWriteWins;

        WeeklySummaryQueries::replace(
            &db,
            &alice,
            &write(&[("A", 10), ("B", 5)], Provenance::Device, t0()),
            mode,
        )
        .await
        .unwrap();
        WeeklySummaryQueries::merge(
            &db,
            &alice,
            &write(&[("A", 12)], Provenance::ServerManual, t0() + Duration::hours(1)),
            mode,
        )
        .await
        .unwrap();

        let stored = WeeklySummaryQueries::get_required(&db, &alice, week().start()).await.unwrap();
        assert_eq!(stored.apps, apps(&[("A", 12), ("B", 5)]));
        assert_eq!(stored.pushed_by, Provenance::ServerManual);
    }

    #[tokio::test]
    async fn test_replace_discards_absent_keys() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");
        let mode = ConsistencyMode::LastWriteWins;

        WeeklySummaryQueries::merge(
            &db,
            &alice,
            &write(&[("A", 10), ("B", 5)], Provenance::ServerCron, t0()),
            mode,
        )
        .await
        .unwrap();
        WeeklySummaryQueries::replace(
            &db,
            &alice,
            &write(&[("A", 12)], Provenance::Device, t0() + Duration::hours(1)),
            mode,
        )
        .await
        .unwrap();

        let stored = WeeklySummaryQueries::get_required(&db, &alice, week().start()).await.unwrap();
        assert_eq!(stored.apps, apps(&[("A", 12)]));
        assert_eq!(stored.pushed_by, Provenance::Device);
    }

    #[tokio::test]
    async fn test_last_write_wins_accepts_older_pushes() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");
        let mode = ConsistencyMode::LastWriteWins;

        WeeklySummaryQueries::replace(&db, &alice, &write(&[("A", 1)], Provenance::Device, t0()), mode)
            .await
            .unwrap();
        let outcome = WeeklySummaryQueries::replace(
            &db,
            &alice,
            &write(&[("A", 2)], Provenance::Device, t0() - Duration::days(1)),
            mode,
        )
        .await
        .unwrap();

        assert_eq!(outcome, WriteOutcome::Applied);
        let stored = WeeklySummaryQueries::get_required(&db, &alice, week().start()).await.unwrap();
        assert_eq!(stored.apps, apps(&[("A", 2)]));
    }

    #[tokio::test]
    async fn test_pushed_at_guard_rejects_older_writes() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");
        let mode = ConsistencyMode::PushedAtGuard;

        WeeklySummaryQueries::merge(&db, &alice, &write(&[("A", 1)], Provenance::ServerCron, t0()), mode)
            .await
            .unwrap();

        let stale = WeeklySummaryQueries::replace(
            &db,
            &alice,
            &write(&[("B", 9)], Provenance::Device, t0() - Duration::seconds(1)),
            mode,
        )
        .await
        .unwrap();
        assert_eq!(stale, WriteOutcome::Stale);

        let fresh = WeeklySummaryQueries::merge(
            &db,
            &alice,
            &write(&[("A", 3)], Provenance::ServerManual, t0() + Duration::milliseconds(250)),
            mode,
        )
        .await
        .unwrap();
        assert_eq!(fresh, WriteOutcome::Applied);

        let stored = WeeklySummaryQueries::get_required(&db, &alice, week().start()).await.unwrap();
        assert_eq!(stored.apps, apps(&[("A", 3)]));
    }

    #[tokio::test]
    async fn test_get_missing_summary() {
        let (db, _dir) = setup_test_db().await;
        let alice = UserId::from("alice");

        assert!(WeeklySummaryQueries::get(&db, &alice, week().start()).await.unwrap().is_none());
        assert!(matches!(
            WeeklySummaryQueries::get_required(&db, &alice, week().start()).await,
            Err(DbError::NotFound(_))
        ));
    }
}
