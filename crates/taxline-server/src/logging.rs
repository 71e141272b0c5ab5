//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. `LOG_FORMAT=json`
/// switches to one JSON object per line.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let base_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);
    let log_layer = if json {
        base_layer.json().with_filter(filter).boxed()
    } else {
        base_layer.with_filter(filter).boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}
