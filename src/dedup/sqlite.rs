use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::dedup::DedupStore;
use crate::error::StorageError;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Open)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Open)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Open)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Open)?;
        Ok(Self { pool })
    }
}

impl DedupStore for SqliteStore {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StorageError>>> {
        let key = key.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM dedup_state WHERE key = ?")
                    .bind(&key)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StorageError::Read)
                    .attach_with(|| format!("key: {key}"))?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let key = key.to_owned();
        let value = value.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO dedup_state (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            )
            .bind(&key)
            .bind(&value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Write)
            .attach_with(|| format!("key: {key}"))?;
            Ok(())
        })
    }
}
