//! `PostgreSQL`-backed [`CounterStore`] shared by every service instance
//! pointing at the same database.
//!
//! The increment is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//! statement, so the row lock taken by the upsert makes it atomic across
//! connections and instances. Expiry is evaluated against the database clock.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::storage::counter::CounterStore;

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS warden_rate_limit_buckets (
    key        TEXT PRIMARY KEY,
    count      BIGINT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
)";

const CREATE_INDEX_SQL: &str = "\
CREATE INDEX IF NOT EXISTS warden_rate_limit_buckets_expires_at
    ON warden_rate_limit_buckets (expires_at)";

const INCREMENT_SQL: &str = "\
INSERT INTO warden_rate_limit_buckets AS b (key, count, expires_at)
VALUES ($1, 1, now() + make_interval(secs => $2))
ON CONFLICT (key) DO UPDATE SET
    count = CASE WHEN b.expires_at <= now() THEN 1 ELSE b.count + 1 END,
    expires_at = CASE WHEN b.expires_at <= now() THEN EXCLUDED.expires_at ELSE b.expires_at END
RETURNING count";

const PURGE_SQL: &str = "DELETE FROM warden_rate_limit_buckets WHERE expires_at <= now()";

/// Counter store persisted in a `warden_rate_limit_buckets` table.
#[derive(Debug, Clone)]
pub struct PostgresCounterStore {
    pool: PgPool,
}

impl PostgresCounterStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the bucket table and its expiry index if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if either DDL statement fails.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX_SQL).execute(&self.pool).await?;
        info!("rate-limit bucket table ready");
        Ok(())
    }

    /// Deletes expired buckets. Optional: expired rows are also reset in place on write.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let removed = sqlx::query(PURGE_SQL)
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(removed, "purged expired rate-limit buckets");
        Ok(removed)
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(INCREMENT_SQL)
            .bind(key)
            .bind(ttl.as_secs_f64())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count)?)
    }
}

/// These run only when `WARDEN_TEST_DATABASE_URL` points at a scratch database.
#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    async fn store() -> Option<PostgresCounterStore> {
        let Ok(url) = std::env::var("WARDEN_TEST_DATABASE_URL") else {
            eprintln!("WARDEN_TEST_DATABASE_URL not set, skipping");
            return None;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PostgresCounterStore::new(pool);
        store.initialize().await.unwrap();
        Some(store)
    }

    fn unique_key(name: &str) -> String {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        format!("test:{name}:{}:{nanos}", std::process::id())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let Some(store) = store().await else { return };
        let key = unique_key("concurrent");

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.increment(&key, Duration::from_secs(60)).await })
            })
            .collect();
        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap());
        }
        counts.sort_unstable();

        assert_eq!(counts, (1..=20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn expired_bucket_restarts_from_one() {
        let Some(store) = store().await else { return };
        let key = unique_key("expiry");
        let ttl = Duration::from_secs(1);

        assert_eq!(store.increment(&key, ttl).await.unwrap(), 1);
        assert_eq!(store.increment(&key, ttl).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(store.increment(&key, ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_removes_expired_buckets() {
        let Some(store) = store().await else { return };
        let key = unique_key("purge");

        store.increment(&key, Duration::from_millis(200)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(store.purge_expired().await.unwrap() >= 1);
        assert_eq!(store.increment(&key, Duration::from_secs(60)).await.unwrap(), 1);
    }
}
