#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the taxline business data pipeline.
//!
//! This crate provides the foundational abstractions shared by the other crates:
//!
//! - [`MonthlyDataProvider`](provider::MonthlyDataProvider) - Monthly purchase/sales totals
//! - [`InvoiceProvider`](provider::InvoiceProvider) - Paginated invoices and their summary
//! - [`Refresher`](provider::Refresher) - Forced write-through of a business' cache entry
//! - [`CacheStore`](cache::CacheStore) - Key/value store with per-key expiration

/// Cache store trait and key-pattern matching.
pub mod cache;
/// Error types for data operations.
pub mod error;
/// Purchase/sales ledger projections of monthly records.
pub mod ledger;
/// Provider traits for fetching business data.
pub mod provider;
/// Core data types (Rut, MonthlyRecord, invoices, refresh reports).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CacheStore, pattern_matches};
pub use error::{DataError, Result};
pub use ledger::{LedgerEntry, LedgerKind};
pub use provider::{DataProvider, InvoiceProvider, MonthlyDataProvider, Refresher};
pub use types::{
    DateRange, InvoicePage, InvoiceQuery, InvoiceSummary, MonthlyRecord, PageMetadata,
    RefreshOutcome, RefreshReport, Rut,
};
