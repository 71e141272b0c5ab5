//! Provider traits for fetching business data.
//!
//! This module defines the core provider traits:
//!
//! - [`DataProvider`] - Base trait for all upstream providers
//! - [`MonthlyDataProvider`] - Monthly purchase/sales totals of a business
//! - [`InvoiceProvider`] - Paginated invoices and their aggregate summary
//! - [`Refresher`] - Forced write-through of a business' cached data

use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{error, warn};

use crate::{
    error::{DataError, Result},
    types::{DateRange, InvoicePage, InvoiceQuery, InvoiceSummary, MonthlyRecord, RefreshOutcome, Rut},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "monthly-sales").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Provider for the monthly financial totals of a business.
#[async_trait]
pub trait MonthlyDataProvider: DataProvider {
    /// Fetches the monthly records, reporting why they are unavailable on failure.
    async fn try_fetch_monthly_data(&self, rut: &Rut) -> Result<Vec<MonthlyRecord>>;

    /// Fetches the monthly records, returning `None` when they are not available.
    ///
    /// Every failure is logged here and never reaches the caller. No retry is performed.
    async fn fetch_monthly_data(&self, rut: &Rut) -> Option<Vec<MonthlyRecord>> {
        match self.try_fetch_monthly_data(rut).await {
            Ok(records) => Some(records),
            Err(e @ DataError::Configuration(_)) => {
                error!(provider = self.name(), rut = %rut, error = %e, "Provider misconfigured");
                None
            }
            Err(e) => {
                warn!(provider = self.name(), rut = %rut, error = %e, "Monthly data not available");
                None
            }
        }
    }
}

/// Provider for paginated invoice documents.
#[async_trait]
pub trait InvoiceProvider: DataProvider {
    /// Fetches one page of invoices.
    async fn fetch_invoice_page(&self, rut: &Rut, query: &InvoiceQuery) -> Result<InvoicePage>;

    /// Fetches aggregate statistics over the invoices in a date range.
    async fn fetch_invoice_summary(&self, rut: &Rut, range: &DateRange) -> Result<InvoiceSummary>;
}

/// Forced refresh of a business' cached data.
///
/// Implemented by the freshness cache layer and called by the event invalidator and
/// the bulk refresh job. Implementations never fail: problems become an outcome.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Re-fetches the data from upstream, bypassing the cache, and overwrites the entry.
    async fn refresh_outcome(&self, rut: &Rut) -> RefreshOutcome;

    /// Like [`Refresher::refresh_outcome`], returning whether the cache write happened.
    async fn refresh(&self, rut: &Rut) -> bool {
        self.refresh_outcome(rut).await.is_stored()
    }
}
