use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the subscription store.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `path` is a file path or `:memory:`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if path != ":memory:" {
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                if let Some(parent) = db_path.parent() {
                    if parent.exists() {
                        // Create with owner-only permissions before SQLite touches it
                        use std::os::unix::fs::OpenOptionsExt;
                        let _file = std::fs::OpenOptions::new()
                            .write(true)
                            .create_new(true)
                            .mode(0o600)
                            .open(db_path)
                            .ok(); // connect_with reports the real error if this failed
                    }
                }
            }
        }

        // busy_timeout applies to every pooled connection
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // One cycle plus a few concurrent commands at most
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Subscription database ready");
        Ok(db)
    }

    /// Run schema migrations inside one transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Identifiers are stored bit-cast from u64, see types::id_to_sql
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                url TEXT NOT NULL,
                last_pubdate TEXT NOT NULL,
                channel_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                UNIQUE(url, channel_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Bulk deletion scopes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_guild ON feeds(guild_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_channel ON feeds(channel_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_and_migrate_twice() {
        let db = Database::open(":memory:").await.unwrap();
        // Second migration must be a no-op
        db.migrate().await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
