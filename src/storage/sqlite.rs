//! SQLite storage backend.

use super::Storage;
use crate::error::{Error, Result, StorageError};
use crate::types::{FeedId, Subscription, SubscriptionHeader, UpdatePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Durable single-file storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

/// Subscription row as stored
#[derive(Debug, FromRow)]
struct SubscriptionRow {
    feed_id: i64,
    vendor: String,
    item_id: String,
    name: String,
    data: Vec<u8>,
    error: Option<String>,
    /// Unix milliseconds; millisecond precision is enough for fair ordering
    updated_at: i64,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            header: SubscriptionHeader::new(FeedId(row.feed_id), row.vendor, row.item_id),
            name: row.name,
            data: row.data,
            error: row.error,
            updated_at: DateTime::from_timestamp_millis(row.updated_at)
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

const SELECT_COLUMNS: &str = "feed_id, vendor, item_id, name, data, error, updated_at";

impl SqliteStorage {
    /// Open (or create) a database file and run migrations
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(StorageError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Storage(StorageError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Storage(StorageError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an ephemeral in-memory database (useful in tests)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await.map_err(|e| {
            Error::Storage(StorageError::ConnectionFailed(format!(
                "Failed to open in-memory database: {}",
                e
            )))
        })?;
        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                feed_id INTEGER NOT NULL,
                vendor TEXT NOT NULL,
                item_id TEXT NOT NULL,
                name TEXT NOT NULL,
                data BLOB NOT NULL,
                error TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (feed_id, vendor, item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::MigrationFailed(format!(
                "Failed to create subscriptions table: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_shift
            ON subscriptions (feed_id, error, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::MigrationFailed(format!(
                "Failed to create shift index: {}",
                e
            )))
        })?;

        Ok(())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create(&self, subscription: Subscription) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (feed_id, vendor, item_id, name, data, error, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscription.header.feed_id.get())
        .bind(&subscription.header.vendor)
        .bind(&subscription.header.item_id)
        .bind(&subscription.name)
        .bind(&subscription.data)
        .bind(&subscription.error)
        .bind(subscription.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::Storage(StorageError::ConstraintViolation(format!(
                    "subscription {} already exists",
                    subscription.header
                ))))
            }
            Err(e) => Err(Error::Storage(StorageError::QueryFailed(format!(
                "Failed to insert subscription: {}",
                e
            )))),
        }
    }

    async fn get(&self, header: &SubscriptionHeader) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions \
             WHERE feed_id = ? AND vendor = ? AND item_id = ?"
        ))
        .bind(header.feed_id.get())
        .bind(&header.vendor)
        .bind(&header.item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to get subscription: {}",
                e
            )))
        })?;

        Ok(row.map(Subscription::from))
    }

    async fn shift(&self, feed_id: FeedId) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions \
             WHERE feed_id = ? AND error IS NULL \
             ORDER BY updated_at ASC LIMIT 1"
        ))
        .bind(feed_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to shift subscription: {}",
                e
            )))
        })?;

        Ok(row.map(Subscription::from))
    }

    async fn update(
        &self,
        at: DateTime<Utc>,
        header: &SubscriptionHeader,
        payload: UpdatePayload,
    ) -> Result<()> {
        let result = match payload {
            UpdatePayload::Cursor(data) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions SET data = ?, error = NULL, updated_at = ?
                    WHERE feed_id = ? AND vendor = ? AND item_id = ?
                    "#,
                )
                .bind(&data)
                .bind(at.timestamp_millis())
                .bind(header.feed_id.get())
                .bind(&header.vendor)
                .bind(&header.item_id)
                .execute(&self.pool)
                .await
            }
            UpdatePayload::Failure(error) => {
                sqlx::query(
                    r#"
                    UPDATE subscriptions SET error = ?, updated_at = ?
                    WHERE feed_id = ? AND vendor = ? AND item_id = ?
                    "#,
                )
                .bind(&error)
                .bind(at.timestamp_millis())
                .bind(header.feed_id.get())
                .bind(&header.vendor)
                .bind(&header.item_id)
                .execute(&self.pool)
                .await
            }
        };

        let result = result.map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to update subscription: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound(header.to_string())));
        }
        Ok(())
    }

    async fn list(&self, feed_id: FeedId) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM subscriptions \
             WHERE feed_id = ? ORDER BY updated_at ASC"
        ))
        .bind(feed_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list subscriptions: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn active_feeds(&self) -> Result<Vec<FeedId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT feed_id FROM subscriptions WHERE error IS NULL ORDER BY feed_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to query active feeds: {}",
                e
            )))
        })?;

        Ok(ids.into_iter().map(FeedId).collect())
    }

    async fn delete(&self, header: &SubscriptionHeader) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM subscriptions WHERE feed_id = ? AND vendor = ? AND item_id = ?",
        )
        .bind(header.feed_id.get())
        .bind(&header.vendor)
        .bind(&header.item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to delete subscription: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound(header.to_string())));
        }
        Ok(())
    }

    async fn clear(&self, feed_id: FeedId, pattern: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE feed_id = ? AND name LIKE ?")
            .bind(feed_id.get())
            .bind(pattern)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to clear subscriptions: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn storage() -> SqliteStorage {
        SqliteStorage::in_memory().await.unwrap()
    }

    fn subscription(feed: i64, item: &str, name: &str) -> Subscription {
        Subscription::new(
            SubscriptionHeader::new(FeedId(feed), "rss", item),
            name,
            b"cursor-0".to_vec(),
        )
    }

    #[tokio::test]
    async fn test_round_trip() {
        let storage = storage().await;
        let sub = subscription(1, "a", "A");
        let header = sub.header.clone();
        storage.create(sub.clone()).await.unwrap();

        let loaded = storage.get(&header).await.unwrap().unwrap();
        assert_eq!(loaded.header, sub.header);
        assert_eq!(loaded.name, sub.name);
        assert_eq!(loaded.data, sub.data);
        assert_eq!(loaded.error, None);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_constraint_violation() {
        let storage = storage().await;
        storage.create(subscription(1, "a", "A")).await.unwrap();

        let err = storage.create(subscription(1, "a", "B")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_shift_matches_memory_backend_semantics() {
        let storage = storage().await;
        let mut older = subscription(1, "a", "A");
        older.updated_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newer = subscription(1, "b", "B");
        newer.updated_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut suspended = subscription(1, "c", "C");
        suspended.error = Some("down".into());

        storage.create(newer).await.unwrap();
        storage.create(older).await.unwrap();
        storage.create(suspended).await.unwrap();

        let shifted = storage.shift(FeedId(1)).await.unwrap().unwrap();
        assert_eq!(shifted.header.item_id, "a");
        assert!(storage.shift(FeedId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_payload_variants() {
        let storage = storage().await;
        let sub = subscription(1, "a", "A");
        let header = sub.header.clone();
        storage.create(sub).await.unwrap();

        let at = Utc.with_ymd_and_hms(2025, 2, 1, 8, 30, 0).unwrap();
        storage
            .update(at, &header, UpdatePayload::Failure("timeout".into()))
            .await
            .unwrap();
        let loaded = storage.get(&header).await.unwrap().unwrap();
        assert_eq!(loaded.error.as_deref(), Some("timeout"));
        assert_eq!(loaded.updated_at, at);

        // A later cursor update clears the suspension
        storage
            .update(Utc::now(), &header, UpdatePayload::Cursor(b"cursor-1".to_vec()))
            .await
            .unwrap();
        let loaded = storage.get(&header).await.unwrap().unwrap();
        assert_eq!(loaded.data, b"cursor-1");
        assert_eq!(loaded.error, None);

        let missing = SubscriptionHeader::new(FeedId(1), "rss", "ghost");
        let err = storage
            .update(Utc::now(), &missing, UpdatePayload::Cursor(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_active_feeds_and_clear() {
        let storage = storage().await;
        storage.create(subscription(1, "a", "daily news")).await.unwrap();
        storage.create(subscription(2, "b", "comics")).await.unwrap();
        let mut suspended = subscription(3, "c", "dead feed");
        suspended.error = Some("gone".into());
        storage.create(suspended).await.unwrap();

        assert_eq!(storage.active_feeds().await.unwrap(), [FeedId(1), FeedId(2)]);

        let deleted = storage.clear(FeedId(1), "%news%").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(storage.list(FeedId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions.db");

        {
            let storage = SqliteStorage::new(&path).await.unwrap();
            storage.create(subscription(1, "a", "A")).await.unwrap();
        }

        let storage = SqliteStorage::new(&path).await.unwrap();
        let header = SubscriptionHeader::new(FeedId(1), "rss", "a");
        assert!(storage.get(&header).await.unwrap().is_some());
    }
}
