//! taxline HTTP service.

use std::sync::Arc;

use envconfig::Envconfig;
use taxline_server::{Config, app, logging, setup, shutdown};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = Config::init_from_env()?;
    info!(config = ?config, "Starting taxline-server");

    let store = setup::build_store(&config.cache).await?;
    let llm = setup::build_llm(&config.llm);
    let state = setup::build_state(&config, store, llm)?;

    let mut invalidator = setup::start_invalidator(&config.kafka, Arc::clone(&state.business));

    let bind = config.bind();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, "Listening");

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown::signal())
        .await;

    if let Some(invalidator) = invalidator.as_mut() {
        let outcome = invalidator.stop().await;
        info!(?outcome, "Event consumer shut down");
    }

    served?;
    info!("Shutdown complete");
    Ok(())
}
