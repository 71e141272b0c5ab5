#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Upstream HTTP clients for taxline.
//!
//! This crate implements the `taxline-core` provider traits over HTTP.
//!
//! # Usage
//!
//! ```rust,ignore
//! use taxline_upstream::MonthlySalesClient;
//! use taxline_core::{MonthlyDataProvider, Rut};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MonthlySalesClient::new("http://localhost:5001", Some("token".into()));
//!
//!     match client.fetch_monthly_data(&Rut::new("76637851-k")).await {
//!         Some(records) => println!("{} periods", records.len()),
//!         None => println!("no data"),
//!     }
//! }
//! ```

use reqwest::{Client, Url};
use std::time::Duration;
use taxline_core::{DataError, Result};

/// Paginated invoices client.
pub mod invoices;
/// Monthly sales client.
pub mod monthly_sales;

pub use invoices::InvoicesClient;
pub use monthly_sales::MonthlySalesClient;

/// Builds an HTTP client with a whole-request timeout.
///
/// # Errors
/// Returns [`DataError::Configuration`] if the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DataError::Configuration(format!("cannot build HTTP client: {e}")))
}

/// Maps a reqwest failure to the transport error kind.
fn transport(e: reqwest::Error) -> DataError {
    if e.is_timeout() {
        DataError::Transport(format!("request timed out: {e}"))
    } else {
        DataError::Transport(e.to_string())
    }
}

/// Appends `segments` to `base`, percent-encoding each one as a single path segment.
fn segment_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| DataError::Configuration(format!("invalid base URL '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| DataError::Configuration(format!("base URL '{base}' cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Joins a base URL and a path without doubling slashes.
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
