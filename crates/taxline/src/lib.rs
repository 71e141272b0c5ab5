#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache layers for the taxline business data pipeline.
//!
//! This crate ties upstream providers to a cache store. It re-exports the core types
//! and the store backends, and provides:
//!
//! - [`BusinessDataCache`] - read-through monthly data with forced refresh
//! - [`InvoiceCache`] - invoice pages and summaries with pattern invalidation
//! - [`BulkRefreshJob`] - sequential refresh of many businesses
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taxline::{BusinessDataCache, InMemoryStore, Rut};
//! use taxline_upstream::MonthlySalesClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = MonthlySalesClient::new("http://localhost:5001", Some("token".into()));
//!     let cache = BusinessDataCache::new(Arc::new(InMemoryStore::new()), Arc::new(provider));
//!
//!     let rut = Rut::new("76637851-k");
//!     if let Some(records) = cache.get_or_fetch(&rut).await {
//!         println!("{} periods", records.len());
//!     }
//!     cache.refresh(&rut).await;
//! }
//! ```

// Core types and traits
pub use taxline_core::*;

// Store implementations
pub use taxline_cache::{InMemoryStore, NoopStore, RedisStore, SqliteStore};

mod bulk;
mod freshness;
mod invoices;

pub use bulk::{BulkRefreshJob, refresh_all};
pub use freshness::{BusinessDataCache, CachePolicy};
pub use invoices::{InvoiceCache, PAGE_TTL, SUMMARY_TTL, page_key, summary_key};
