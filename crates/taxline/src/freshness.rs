//! Read-through cache of monthly business data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use taxline_core::cache::validate_ttl;
use taxline_core::{
    CacheStore, LedgerEntry, LedgerKind, MonthlyDataProvider, MonthlyRecord, RefreshOutcome,
    Refresher, Result, Rut,
};

/// Key prefix and time-to-live of one cache layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    prefix: String,
    ttl: Duration,
}

impl CachePolicy {
    /// Lifetime of `business_data:{rut}` entries.
    pub const BUSINESS_DATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);
    /// Lifetime of `business:monthly:{rut}` entries.
    pub const MONTHLY_VIEW_TTL: Duration = Duration::from_secs(15 * 60);

    /// Create a policy. Keys are `{prefix}:{rut}`.
    ///
    /// # Errors
    /// Returns [`taxline_core::DataError::InvalidParameter`] for a zero TTL.
    pub fn new(prefix: impl Into<String>, ttl: Duration) -> Result<Self> {
        validate_ttl(Some(ttl))?;
        Ok(Self {
            prefix: prefix.into(),
            ttl,
        })
    }

    /// `business_data:{rut}` for 24 hours. Used for question answering and refreshes.
    #[must_use]
    pub fn business_data() -> Self {
        Self {
            prefix: "business_data".to_string(),
            ttl: Self::BUSINESS_DATA_TTL,
        }
    }

    /// `business:monthly:{rut}` for 15 minutes.
    #[must_use]
    pub fn monthly_view() -> Self {
        Self {
            prefix: "business:monthly".to_string(),
            ttl: Self::MONTHLY_VIEW_TTL,
        }
    }

    /// Cache key for a business.
    #[must_use]
    pub fn key(&self, rut: &Rut) -> String {
        format!("{}:{rut}", self.prefix)
    }

    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::business_data()
    }
}

/// Monthly data of a business, read through a [`CacheStore`].
///
/// `get_or_fetch` serves cached entries and fills misses from the upstream;
/// `refresh` always goes upstream and overwrites the entry. No lock is taken around
/// either: concurrent writers for the same business race and the last write wins.
///
/// A store that cannot be reached is treated as a miss on read and logged on write,
/// so callers still get upstream data when the cache is down.
#[derive(Clone)]
pub struct BusinessDataCache {
    store: Arc<dyn CacheStore>,
    provider: Arc<dyn MonthlyDataProvider>,
    policy: CachePolicy,
}

impl std::fmt::Debug for BusinessDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessDataCache")
            .field("store", &self.store.name())
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BusinessDataCache {
    /// Create a cache layer with the `business_data` policy.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, provider: Arc<dyn MonthlyDataProvider>) -> Self {
        Self {
            store,
            provider,
            policy: CachePolicy::business_data(),
        }
    }

    /// Use a different key prefix and TTL.
    #[must_use]
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Reads and decodes the cached entry. Any failure counts as a miss.
    async fn cached(&self, key: &str) -> Option<Vec<MonthlyRecord>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, store = self.store.name(), error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached entry is not valid monthly data, ignoring");
                None
            }
        }
    }

    async fn write(&self, key: &str, records: &[MonthlyRecord]) -> Result<()> {
        let value = serde_json::to_string(records)?;
        self.store.set_ex(key, self.policy.ttl, &value).await
    }

    /// Cached monthly data, fetched from upstream on a miss.
    ///
    /// Returns `None` when the data is not cached and the upstream has none. A miss
    /// that the upstream cannot fill leaves the cache untouched.
    #[instrument(skip(self), fields(rut = %rut))]
    pub async fn get_or_fetch(&self, rut: &Rut) -> Option<Vec<MonthlyRecord>> {
        let key = self.policy.key(rut);

        if let Some(records) = self.cached(&key).await {
            debug!(key = %key, "Cache hit for monthly data");
            return Some(records);
        }

        debug!(key = %key, provider = self.provider.name(), "Cache miss, fetching monthly data");
        let records = self.provider.fetch_monthly_data(rut).await?;

        if let Err(e) = self.write(&key, &records).await {
            warn!(key = %key, error = %e, "Failed to cache monthly data");
        }
        Some(records)
    }

    /// Re-fetches from upstream, ignoring any cached entry, and overwrites it.
    #[instrument(skip(self), fields(rut = %rut))]
    pub async fn refresh_outcome(&self, rut: &Rut) -> RefreshOutcome {
        let Some(records) = self.provider.fetch_monthly_data(rut).await else {
            warn!("No upstream data, cache not updated");
            return RefreshOutcome::SkippedNoData;
        };

        let key = self.policy.key(rut);
        match self.write(&key, &records).await {
            Ok(()) => {
                debug!(key = %key, periods = records.len(), "Cache refreshed");
                RefreshOutcome::Stored
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to store refreshed data");
                RefreshOutcome::Failed
            }
        }
    }

    /// Like [`BusinessDataCache::refresh_outcome`], returning whether the entry was written.
    pub async fn refresh(&self, rut: &Rut) -> bool {
        self.refresh_outcome(rut).await.is_stored()
    }

    /// One side of the monthly data, in period order.
    pub async fn ledger(&self, rut: &Rut, kind: LedgerKind) -> Option<Vec<LedgerEntry>> {
        let records = self.get_or_fetch(rut).await?;
        Some(kind.project_all(&records))
    }
}

#[async_trait]
impl Refresher for BusinessDataCache {
    async fn refresh_outcome(&self, rut: &Rut) -> RefreshOutcome {
        Self::refresh_outcome(self, rut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use taxline_cache::{InMemoryStore, NoopStore};
    use taxline_core::{DataError, DataProvider};

    /// Upstream double returning whatever `data` holds, counting calls.
    #[derive(Debug, Default)]
    struct CountingProvider {
        data: Mutex<Option<Vec<MonthlyRecord>>>,
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn with(data: Option<Vec<MonthlyRecord>>) -> Arc<Self> {
            Arc::new(Self {
                data: Mutex::new(data),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, data: Option<Vec<MonthlyRecord>>) {
            *self.data.lock().unwrap() = data;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "Counts upstream calls"
        }
    }

    #[async_trait]
    impl MonthlyDataProvider for CountingProvider {
        async fn try_fetch_monthly_data(&self, _rut: &Rut) -> Result<Vec<MonthlyRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.data
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| DataError::Transport("connection refused".into()))
        }
    }

    fn records(total: f64) -> Vec<MonthlyRecord> {
        vec![
            MonthlyRecord::new("2024-02").with_purchases(total, total * 0.19),
            MonthlyRecord::new("2024-03").with_sales(total * 2.0, total * 0.38),
        ]
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(1.0)));
        let cache = BusinessDataCache::new(store.clone(), provider.clone());
        let rut = Rut::new("76111111-1");

        let cached = records(500.0);
        store
            .set_ex(
                "business_data:76111111-1",
                Duration::from_secs(60),
                &serde_json::to_string(&cached).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(cache.get_or_fetch(&rut).await, Some(cached));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(100.0)));
        let cache = BusinessDataCache::new(store.clone(), provider.clone());
        let rut = Rut::new("76637851-k");

        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(100.0)));
        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(100.0)));
        assert_eq!(provider.calls(), 1);

        let ttl = store.ttl("business_data:76637851-k").await.unwrap();
        assert!(ttl > Duration::from_secs(23 * 60 * 60));
    }

    #[tokio::test]
    async fn test_unavailable_upstream_is_not_cached() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(None);
        let cache = BusinessDataCache::new(store.clone(), provider.clone());
        let rut = Rut::new("76222222-2");

        assert_eq!(cache.get_or_fetch(&rut).await, None);
        assert!(store.is_empty().await);

        provider.set(Some(records(3.0)));
        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(3.0)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_and_overwrites() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(1.0)));
        let cache = BusinessDataCache::new(store.clone(), provider.clone());
        let rut = Rut::new("76111111-1");

        cache.get_or_fetch(&rut).await;
        provider.set(Some(records(2.0)));

        assert!(cache.refresh(&rut).await);
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(2.0)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(7.0)));
        let cache = BusinessDataCache::new(store.clone(), provider);
        let rut = Rut::new("76111111-1");

        let key = "business_data:76111111-1";

        assert!(cache.refresh(&rut).await);
        let first = store.get(key).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let aged = store.ttl(key).await.unwrap();

        assert!(cache.refresh(&rut).await);
        let second = store.get(key).await.unwrap();
        let reset = store.ttl(key).await.unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(reset > aged, "ttl not reset: {aged:?} -> {reset:?}");
    }

    #[tokio::test]
    async fn test_refresh_without_data_keeps_entry() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(1.0)));
        let cache = BusinessDataCache::new(store.clone(), provider.clone());
        let rut = Rut::new("76111111-1");

        cache.get_or_fetch(&rut).await;
        provider.set(None);

        assert_eq!(cache.refresh_outcome(&rut).await, RefreshOutcome::SkippedNoData);
        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(1.0)));
    }

    #[tokio::test]
    async fn test_store_down_still_serves_upstream() {
        let provider = CountingProvider::with(Some(records(1.0)));
        let cache = BusinessDataCache::new(Arc::new(NoopStore::new()), provider.clone());
        let rut = Rut::new("1");

        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(1.0)));
        assert_eq!(cache.get_or_fetch(&rut).await, Some(records(1.0)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(InMemoryStore::new());
        store.set("business_data:1", "not json", None).await.unwrap();
        let provider = CountingProvider::with(Some(records(1.0)));
        let cache = BusinessDataCache::new(store.clone(), provider.clone());

        assert_eq!(cache.get_or_fetch(&Rut::new("1")).await, Some(records(1.0)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_monthly_view_policy_and_ledger() {
        let store = Arc::new(InMemoryStore::new());
        let provider = CountingProvider::with(Some(records(1000.0)));
        let cache = BusinessDataCache::new(store.clone(), provider)
            .with_policy(CachePolicy::monthly_view());
        let rut = Rut::new("761");

        let sales = cache.ledger(&rut, LedgerKind::Sales).await.unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].total, None);
        assert_eq!(sales[1].total, Some(2000.0));

        assert!(store.get("business:monthly:761").await.unwrap().is_some());
        assert!(store.ttl("business:monthly:761").await.unwrap() <= CachePolicy::MONTHLY_VIEW_TTL);
    }

    #[test]
    fn test_policy_rejects_zero_ttl() {
        assert!(CachePolicy::new("x", Duration::ZERO).is_err());
        let policy = CachePolicy::new("x", Duration::from_secs(1)).unwrap();
        assert_eq!(policy.key(&Rut::new("9")), "x:9");
    }
}
