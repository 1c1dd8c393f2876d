use crate::connection::Database;
use crate::error::Result;
use usage_rollup_common::UserId;

pub struct UserQueries;

impl UserQueries {
    /// Register a user identity. Registering an existing user is a no-op.
    pub async fn ensure(db: &Database, user: &UserId) -> Result<bool> {
        let pool = db.pool()?;

        let result = sqlx::query("INSERT OR IGNORE INTO users (id) VALUES (?)")
            .bind(user.as_str())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_ids(db: &Database) -> Result<Vec<UserId>> {
        let pool = db.pool()?;

        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM users ORDER BY id").fetch_all(pool).await?;

        Ok(ids.into_iter().map(UserId::from).collect())
    }

    pub async fn count(db: &Database) -> Result<i64> {
        let pool = db.pool()?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(pool).await?;
        Ok(count)
    }
}
