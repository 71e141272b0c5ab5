//! No-op store implementation.

use async_trait::async_trait;
use std::time::Duration;
use taxline_core::cache::validate_ttl;
use taxline_core::{CacheStore, Result};
use tracing::trace;

/// A no-op store that doesn't keep anything.
///
/// Every `get` misses and every `set` succeeds without storing. Useful for disabling
/// caching or exercising the always-fetch-upstream code path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl NoopStore {
    /// Create a new no-op store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NoopStore {
    fn name(&self) -> &str {
        "noop"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        trace!("NoopStore: get called, returning None");
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, ttl: Option<Duration>) -> Result<()> {
        trace!("NoopStore: set called, doing nothing");
        validate_ttl(ttl)
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize> {
        trace!("NoopStore: delete called, returning 0");
        Ok(0)
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        trace!("NoopStore: keys called, returning nothing");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_never_hits() {
        let store = NoopStore::new();
        store
            .set("business_data:1", "[]", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(store.get("business_data:1").await.unwrap().is_none());
        assert!(store.keys("*").await.unwrap().is_empty());
        assert_eq!(store.delete_matching("*").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_noop_store_validates_ttl() {
        let store = NoopStore::new();
        assert!(store.set("k", "v", Some(Duration::ZERO)).await.is_err());
    }
}
