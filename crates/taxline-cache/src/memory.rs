//! In-memory store implementation.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;
use taxline_core::cache::validate_ttl;
use taxline_core::{CacheStore, Result, pattern_matches};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cache entry with an absolute expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
            Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store for tests and development.
///
/// Values live in a `RwLock`-protected `HashMap` and are lost when the store is
/// dropped. Expired entries are invisible to reads and listings; they are physically
/// removed on overwrite, delete, or [`InMemoryStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    /// Remaining time-to-live of a live key. `None` if absent, expired, or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry
            .expires_at
            .and_then(|at| at.signed_duration_since(now).to_std().ok())
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Returns true if there are no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Utc::now()) => {
                debug!("Cache hit");
                Ok(Some(entry.value.clone()))
            }
            _ => {
                debug!("Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        validate_ttl(ttl)?;
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        debug!(ttl_secs = ttl.map(|t| t.as_secs()), "Cached value");
        Ok(())
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|entry| !entry.is_expired(now))
            .count();
        debug!("Deleted {} cache entries", removed);
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
