#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache store backends for taxline.
//!
//! This crate provides implementations of the [`CacheStore`] trait from `taxline-core`:
//!
//! - [`RedisStore`] - Redis backend (default, requires `redis` feature)
//! - [`SqliteStore`] - Persistent SQLite backend (requires `sqlite` feature)
//! - [`InMemoryStore`] - Process-local store with TTL support
//! - [`NoopStore`] - Store that never keeps anything

/// In-memory store implementation.
pub mod memory;
/// No-op store implementation.
pub mod noop;

/// Redis store implementation.
#[cfg(feature = "redis")]
pub mod redis_store;

/// SQLite store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use taxline_core::CacheStore;

// Re-export implementations
pub use memory::InMemoryStore;
pub use noop::NoopStore;

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
