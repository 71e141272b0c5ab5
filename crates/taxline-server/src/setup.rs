//! Builds the service's components from [`Config`].

use std::sync::Arc;
use std::time::Duration;

use taxline::{
    BulkRefreshJob, BusinessDataCache, CacheStore, InMemoryStore, InvoiceCache, Result,
    RedisStore, SqliteStore,
};
use taxline_events::{CacheInvalidator, DecoderChain, KafkaEventSource, SchemaRegistry};
use taxline_llm::{LanguageModel, LlmBackend, OllamaClient, OpenAiClient, UnconfiguredModel};
use taxline_upstream::{InvoicesClient, MonthlySalesClient};
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::config::{CacheBackend, CacheConfig, Config, KafkaConfig, LlmConfig};

const OPENAI_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens the configured cache store.
///
/// # Errors
/// Returns the store's error if it cannot be opened or reached.
pub async fn build_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Redis => Arc::new(RedisStore::connect(config.redis_url.clone()).await?),
        CacheBackend::Sqlite => Arc::new(SqliteStore::new(&config.sqlite_path)?),
        CacheBackend::Memory => Arc::new(InMemoryStore::new()),
    };
    info!(store = store.name(), "Cache store ready");
    Ok(store)
}

/// Builds the configured language model.
///
/// An unknown service name, or a client that cannot be built, yields a model whose
/// every answer says the service is not configured.
#[must_use]
pub fn build_llm(config: &LlmConfig) -> Arc<dyn LanguageModel> {
    let built: Result<Arc<dyn LanguageModel>> = match config.service.parse::<LlmBackend>() {
        Ok(LlmBackend::Ollama) => OllamaClient::new(&config.ollama_host, &config.ollama_model)
            .map(|c| Arc::new(c) as Arc<dyn LanguageModel>),
        Ok(LlmBackend::OpenAi) => OpenAiClient::with_timeout(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            &config.openai_model,
            OPENAI_TIMEOUT,
        )
        .map(|c| Arc::new(c) as Arc<dyn LanguageModel>),
        Err(e) => Err(e),
    };

    match built {
        Ok(model) => {
            info!(model = model.name(), "Language model ready");
            model
        }
        Err(e) => {
            error!(service = %config.service, error = %e, "Language model not available");
            Arc::new(UnconfiguredModel::new(config.service.clone()))
        }
    }
}

/// Wires the cache layers and upstream clients over `store`.
///
/// # Errors
/// Returns a configuration error if an HTTP client cannot be built.
pub fn build_state(
    config: &Config,
    store: Arc<dyn CacheStore>,
    llm: Arc<dyn LanguageModel>,
) -> Result<AppState> {
    let upstream = &config.upstream;

    let monthly = MonthlySalesClient::with_timeout(
        &upstream.monthly_sales_url,
        upstream.monthly_sales_token.clone(),
        upstream.timeout(),
    )?;
    if !monthly.has_token() {
        warn!("BUSINESS_INVOICES_TOKEN is not set; monthly data requests will fail");
    }
    let invoices =
        InvoicesClient::with_timeout(&upstream.invoices_url, &upstream.invoices_key, upstream.timeout())?;

    let business = Arc::new(BusinessDataCache::new(Arc::clone(&store), Arc::new(monthly)));
    let bulk = BulkRefreshJob::new(business.clone(), config.bulk_ruts());

    Ok(AppState {
        invoices: Arc::new(InvoiceCache::new(store, Arc::new(invoices))),
        business,
        llm,
        bulk,
    })
}

/// Starts the event-driven invalidator, if enabled.
///
/// A consumer that cannot be created is logged and the service runs without it.
#[must_use]
pub fn start_invalidator(config: &KafkaConfig, business: Arc<BusinessDataCache>) -> Option<CacheInvalidator> {
    if !config.enabled {
        info!("Event consumer disabled");
        return None;
    }

    let decoders = match build_decoders(config) {
        Ok(decoders) => decoders,
        Err(e) => {
            error!(error = %e, "Failed to build event decoders; continuing without invalidation");
            return None;
        }
    };

    let source = match KafkaEventSource::new(config.settings()) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Failed to create event consumer; continuing without invalidation");
            return None;
        }
    };

    let mut invalidator = CacheInvalidator::new(business, decoders);
    invalidator.start(source);
    Some(invalidator)
}

/// Avro then JSON, with writer schemas from the registry when one is configured.
///
/// # Errors
/// Returns a configuration error if the embedded schema or the registry client cannot
/// be built.
pub fn build_decoders(config: &KafkaConfig) -> Result<DecoderChain> {
    match config.registry_url() {
        Some(url) => {
            info!(registry = %url, "Resolving Avro writer schemas through the registry");
            DecoderChain::with_registry(Arc::new(SchemaRegistry::new(url)?))
        }
        None => {
            warn!("No schema registry configured; decoding with the embedded schema");
            DecoderChain::standard()
        }
    }
}
