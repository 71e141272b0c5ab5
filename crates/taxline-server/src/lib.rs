#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Routes and handlers.
pub mod app;
/// Environment configuration.
pub mod config;
/// Log output.
pub mod logging;
/// Component construction.
pub mod setup;
/// Shutdown signal.
pub mod shutdown;

pub use app::{AppState, app};
pub use config::Config;
