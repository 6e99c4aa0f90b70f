use std::future::Future;

use anyhow::Result;

use super::schema::Database;

/// A string-keyed durable store.
///
/// This is the only thing the record layer needs from persistence, so tests
/// and alternative substrates can stand in for SQLite.
pub trait KvStore {
    /// Read the value stored under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Insert or replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;
}

impl Database {
    // ========================================================================
    // Key-Value Operations
    // ========================================================================

    /// Get a single value by key.
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a value (UPSERT), refreshing its `updated_at` timestamp.
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl KvStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value).await
    }
}
