//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use taxline_core::cache::validate_ttl;
use taxline_core::{CacheStore, DataError, Result, pattern_matches};
use tracing::{debug, instrument};

/// SQLite-based key/value store with expiration.
///
/// Entries persist across restarts. Expiry is stored as absolute Unix milliseconds
/// and evaluated on every read, so expired rows are never returned even before
/// [`SqliteStore::purge_expired`] deletes them.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER
            )",
            [],
        )
        .map_err(unavailable)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_kv_cache_expires_at ON kv_cache(expires_at)",
            [],
        )
        .map_err(unavailable)?;

        debug!("SQLite cache schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::CacheUnavailable(e.to_string()))
    }

    /// Deletes expired rows. Returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the delete statement fails.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM kv_cache WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_millis()],
            )
            .map_err(unavailable)?;
        if removed > 0 {
            debug!("Purged {} expired cache rows", removed);
        }
        Ok(removed)
    }
}

fn unavailable(e: rusqlite::Error) -> DataError {
    DataError::CacheUnavailable(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_at(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_add(ttl)
    })
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_cache
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(unavailable)?;

        match value {
            Some(_) => debug!("Cache hit"),
            None => debug!("Cache miss"),
        }
        Ok(value)
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        validate_ttl(ttl)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at(ttl)],
        )
        .map_err(unavailable)?;
        debug!(ttl_secs = ttl.map(|t| t.as_secs()), "Cached value");
        Ok(())
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let conn = self.lock()?;
        let now = now_millis();
        let mut removed = 0usize;
        for key in keys {
            removed += conn
                .execute(
                    "DELETE FROM kv_cache
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                )
                .map_err(unavailable)?;
            // Expired leftovers go too, they just don't count.
            conn.execute("DELETE FROM kv_cache WHERE key = ?1", params![key])
                .map_err(unavailable)?;
        }
        debug!("Deleted {} cache rows", removed);
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT key FROM kv_cache
                 WHERE expires_at IS NULL OR expires_at > ?1
                 ORDER BY key ASC",
            )
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(params![now_millis()], |row| row.get::<_, String>(0))
            .map_err(unavailable)?;

        let mut keys = Vec::new();
        for row in rows {
            let key = row.map_err(unavailable)?;
            if pattern_matches(pattern, &key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
