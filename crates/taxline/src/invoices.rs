//! Cache of paginated and date-filtered invoice queries.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use taxline_core::{
    CacheStore, DateRange, InvoicePage, InvoiceProvider, InvoiceQuery, InvoiceSummary, Result, Rut,
};

/// Lifetime of a cached invoice page.
pub const PAGE_TTL: Duration = Duration::from_secs(5 * 60);
/// Lifetime of a cached invoice summary.
pub const SUMMARY_TTL: Duration = Duration::from_secs(15 * 60);

const KEY_DATE_FORMAT: &str = "%Y%m%d";

fn range_suffix(range: &DateRange) -> String {
    let mut suffix = String::new();
    if let Some(start) = range.start {
        suffix.push_str(&format!(":sd{}", start.format(KEY_DATE_FORMAT)));
    }
    if let Some(end) = range.end {
        suffix.push_str(&format!(":ed{}", end.format(KEY_DATE_FORMAT)));
    }
    suffix
}

/// `facturas:{rut}:p{page}:pp{per_page}[:sd{YYYYMMDD}][:ed{YYYYMMDD}]`
#[must_use]
pub fn page_key(rut: &Rut, query: &InvoiceQuery) -> String {
    format!(
        "facturas:{rut}:p{}:pp{}{}",
        query.page,
        query.per_page,
        range_suffix(&query.range)
    )
}

/// `facturas:resumen:{rut}[:sd{YYYYMMDD}][:ed{YYYYMMDD}]`
#[must_use]
pub fn summary_key(rut: &Rut, range: &DateRange) -> String {
    format!("facturas:resumen:{rut}{}", range_suffix(range))
}

/// Escapes glob metacharacters so a value matches only itself in a key pattern.
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Invoice pages and summaries read through a [`CacheStore`].
///
/// Upstream failures degrade to an empty page or summary, which is returned but not
/// cached, so the next call tries the upstream again.
#[derive(Clone)]
pub struct InvoiceCache {
    store: Arc<dyn CacheStore>,
    provider: Arc<dyn InvoiceProvider>,
}

impl std::fmt::Debug for InvoiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceCache")
            .field("store", &self.store.name())
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl InvoiceCache {
    /// Create an invoice cache.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, provider: Arc<dyn InvoiceProvider>) -> Self {
        Self { store, provider }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, ttl: Duration, value: &T) {
        let result: Result<()> = async {
            let raw = serde_json::to_string(value)?;
            self.store.set_ex(key, ttl, &raw).await
        }
        .await;
        if let Err(e) = result {
            warn!(key = %key, error = %e, "Failed to cache invoices");
        }
    }

    /// One page of invoices, cached for [`PAGE_TTL`].
    #[instrument(skip(self), fields(rut = %rut))]
    pub async fn page(&self, rut: &Rut, query: &InvoiceQuery) -> InvoicePage {
        let key = page_key(rut, query);
        if let Some(page) = self.read(&key).await {
            return page;
        }

        match self.provider.fetch_invoice_page(rut, query).await {
            Ok(page) => {
                self.write(&key, PAGE_TTL, &page).await;
                page
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Invoices not available, returning empty page");
                InvoicePage::empty(query)
            }
        }
    }

    /// Aggregate invoice statistics, cached for [`SUMMARY_TTL`].
    #[instrument(skip(self), fields(rut = %rut))]
    pub async fn summary(&self, rut: &Rut, range: &DateRange) -> InvoiceSummary {
        let key = summary_key(rut, range);
        if let Some(summary) = self.read(&key).await {
            return summary;
        }

        match self.provider.fetch_invoice_summary(rut, range).await {
            Ok(summary) => {
                self.write(&key, SUMMARY_TTL, &summary).await;
                summary
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Invoice summary not available, returning empty summary");
                InvoiceSummary::default()
            }
        }
    }

    /// Drops every cached page of a business, then re-caches the first page and the
    /// unfiltered summary.
    ///
    /// Returns how many keys were deleted. Summary keys are not matched by the page
    /// pattern; the unfiltered summary is overwritten only if the upstream answers.
    ///
    /// # Errors
    /// Returns [`taxline_core::DataError::CacheUnavailable`] if the pattern delete fails.
    #[instrument(skip(self), fields(rut = %rut))]
    pub async fn invalidate(&self, rut: &Rut) -> Result<usize> {
        let pattern = format!("facturas:{}:*", escape_glob(rut.as_str()));
        let removed = self.store.delete_matching(&pattern).await?;
        info!(pattern = %pattern, removed, "Invalidated invoice pages");

        let query = InvoiceQuery::default();
        let range = DateRange::unbounded();

        match self.provider.fetch_invoice_page(rut, &query).await {
            Ok(page) => self.write(&page_key(rut, &query), PAGE_TTL, &page).await,
            Err(e) => warn!(error = %e, "Could not pre-cache first invoice page"),
        }
        match self.provider.fetch_invoice_summary(rut, &range).await {
            Ok(summary) => {
                self.write(&summary_key(rut, &range), SUMMARY_TTL, &summary)
                    .await;
            }
            Err(e) => warn!(error = %e, "Could not pre-cache invoice summary"),
        }
        Ok(removed)
    }
}
