//! Core data types for business financial data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Rut`] - Opaque business identifier
//! - [`MonthlyRecord`] - One accounting period of purchase/sales totals
//! - [`RefreshOutcome`] / [`RefreshReport`] - Results of forced refreshes
//! - [`InvoiceQuery`], [`InvoicePage`], [`InvoiceSummary`] - Paginated invoice data

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A business identifier (RUT).
///
/// The identifier is an opaque token: it is never parsed, normalized or re-cased,
/// so two RUTs are equal only if their strings are byte-for-byte equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rut(String);

impl Rut {
    /// Creates a new identifier from a string, unchanged.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Rut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Rut {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Rut {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Rut {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Monthly purchase and sales aggregates for one accounting period.
///
/// Every aggregate is optional: the upstream omits fields it has no value for, and an
/// omitted field stays `None` through a cache round-trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    /// Period label, e.g. `"2024-03"`.
    #[serde(default)]
    pub period: String,

    // Purchases
    /// Total purchases.
    #[serde(default)]
    pub total_purchases: Option<f64>,
    /// Purchases backed by discount documents (credit notes).
    #[serde(default)]
    pub total_purchases_discount_document: Option<f64>,
    /// VAT-exempt purchases.
    #[serde(default)]
    pub total_purchases_exempt: Option<f64>,
    /// VAT paid on purchases.
    #[serde(default)]
    pub total_purchases_iva: Option<f64>,
    /// Net purchases including exempt purchases.
    #[serde(default)]
    pub total_purchases_net_with_exempt_purchases: Option<f64>,
    /// Net purchases.
    #[serde(default)]
    pub total_purchases_neto: Option<f64>,
    /// Purchase tax of common use.
    #[serde(default)]
    pub total_purchases_tax_common_use: Option<f64>,
    /// Non-recoverable purchase tax.
    #[serde(default)]
    pub total_purchases_tax_no_recoverable: Option<f64>,
    /// Recoverable purchase tax.
    #[serde(default)]
    pub total_purchases_tax_recoverable: Option<f64>,

    // Sales
    /// Total sales.
    #[serde(default)]
    pub total_sales: Option<f64>,
    /// Sales backed by discount documents (credit notes).
    #[serde(default)]
    pub total_sales_discount_document: Option<f64>,
    /// VAT-exempt sales.
    #[serde(default)]
    pub total_sales_exempt: Option<f64>,
    /// VAT charged on sales.
    #[serde(default)]
    pub total_sales_iva: Option<f64>,
    /// Net sales including exempt sales.
    #[serde(default)]
    pub total_sales_net_with_exempt_sales: Option<f64>,
    /// Net sales.
    #[serde(default)]
    pub total_sales_neto: Option<f64>,
    /// Sales tax of common use.
    #[serde(default)]
    pub total_sales_tax_common_use: Option<f64>,
    /// Non-recoverable sales tax.
    #[serde(default)]
    pub total_sales_tax_no_recoverable: Option<f64>,
    /// Recoverable sales tax.
    #[serde(default)]
    pub total_sales_tax_recoverable: Option<f64>,
}

impl MonthlyRecord {
    /// Creates an empty record for the given period.
    #[must_use]
    pub fn new(period: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            ..Default::default()
        }
    }

    /// Sets total purchases and purchase VAT.
    #[must_use]
    pub const fn with_purchases(mut self, total: f64, iva: f64) -> Self {
        self.total_purchases = Some(total);
        self.total_purchases_iva = Some(iva);
        self
    }

    /// Sets total sales and sales VAT.
    #[must_use]
    pub const fn with_sales(mut self, total: f64, iva: f64) -> Self {
        self.total_sales = Some(total);
        self.total_sales_iva = Some(iva);
        self
    }
}

/// Result of one forced refresh of a business' cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Fresh data was fetched and written to the cache.
    Stored,
    /// The upstream had no data; the cache was left untouched.
    SkippedNoData,
    /// Data was fetched but the cache write failed.
    Failed,
}

impl RefreshOutcome {
    /// Returns true only when the cache entry was written.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Aggregate report of a bulk refresh, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Identifiers whose cache entry was written.
    pub succeeded: Vec<Rut>,
    /// Identifiers whose refresh was skipped or failed.
    pub failed: Vec<Rut>,
}

impl RefreshReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Records the outcome for one identifier.
    pub fn record(&mut self, rut: Rut, outcome: RefreshOutcome) {
        if outcome.is_stored() {
            self.succeeded.push(rut);
        } else {
            self.failed.push(rut);
        }
    }

    /// Total number of identifiers processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Optional inclusive date filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included.
    pub start: Option<NaiveDate>,
    /// Last day included.
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// A range with no bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// A range with both bounds set.
    #[must_use]
    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Query parameters for one page of invoices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceQuery {
    /// 1-based page number.
    pub page: u32,
    /// Documents per page.
    pub per_page: u32,
    /// Optional date filter.
    pub range: DateRange,
}

impl Default for InvoiceQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
            range: DateRange::unbounded(),
        }
    }
}

impl InvoiceQuery {
    /// Creates a query for the given page with the default page size.
    #[must_use]
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    /// Sets the date filter.
    #[must_use]
    pub const fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }
}

/// Pagination metadata returned with a page of invoices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// 1-based page number.
    pub page: u32,
    /// Documents per page.
    pub per_page: u32,
    /// Total number of documents across pages.
    #[serde(default)]
    pub total_docs: u64,
    /// Total number of pages.
    #[serde(default)]
    pub total_pages: u64,
}

/// One page of invoices. Invoice documents are passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePage {
    /// Invoice documents.
    #[serde(default)]
    pub facturas: Vec<serde_json::Value>,
    /// Pagination metadata.
    pub metadata: PageMetadata,
}

impl InvoicePage {
    /// An empty page for the given query, used when the upstream is unavailable.
    #[must_use]
    pub fn empty(query: &InvoiceQuery) -> Self {
        Self {
            facturas: Vec::new(),
            metadata: PageMetadata {
                page: query.page,
                per_page: query.per_page,
                total_docs: 0,
                total_pages: 0,
            },
        }
    }
}

/// Aggregate statistics over a business' invoices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceSummary {
    /// Number of invoices.
    pub total_facturas: u64,
    /// Sum of invoice amounts.
    pub monto_total: f64,
    /// Mean invoice amount.
    pub promedio_monto: f64,
    /// Largest invoice amount.
    pub max_monto: f64,
    /// Smallest invoice amount.
    pub min_monto: f64,
    /// Per-month breakdown, passed through untouched.
    pub facturas_por_mes: Vec<serde_json::Value>,
}
