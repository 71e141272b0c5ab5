//! Environment configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;
use taxline::{DataError, Rut};
use taxline_events::KafkaSettings;

/// Service settings, read once at startup.
#[derive(Envconfig, Clone)]
pub struct Config {
    /// Address to listen on.
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[envconfig(from = "BIND_PORT", default = "8000")]
    pub port: u16,

    /// Businesses refreshed by `{"all": true}`, comma separated.
    #[envconfig(
        from = "BULK_REFRESH_RUTS",
        default = "76111111-1,76222222-2,76637851-k"
    )]
    pub bulk_refresh_ruts: String,

    /// Event consumer settings.
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    /// Cache store settings.
    #[envconfig(nested = true)]
    pub cache: CacheConfig,

    /// Upstream API settings.
    #[envconfig(nested = true)]
    pub upstream: UpstreamConfig,

    /// Language model settings.
    #[envconfig(nested = true)]
    pub llm: LlmConfig,
}

impl Config {
    /// `host:port` to bind the listener to.
    #[must_use]
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The bulk refresh list, trimmed, without blank entries.
    #[must_use]
    pub fn bulk_ruts(&self) -> Vec<Rut> {
        parse_rut_list(&self.bulk_refresh_ruts)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bulk_refresh_ruts", &self.bulk_refresh_ruts)
            .field("kafka", &self.kafka)
            .field("cache", &self.cache)
            .field("upstream", &self.upstream)
            .field("llm", &self.llm)
            .finish()
    }
}

/// Event consumer settings.
#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    /// Start the invalidator at all.
    #[envconfig(from = "KAFKA_ENABLED", default = "true")]
    pub enabled: bool,

    /// Broker list.
    #[envconfig(from = "KAFKA_BOOTSTRAP_SERVERS", default = "localhost:9094")]
    pub bootstrap_servers: String,

    /// Client id reported to the brokers.
    #[envconfig(from = "KAFKA_CLIENT_ID", default = "orquestador-app-development")]
    pub client_id: String,

    /// Topic carrying business updates.
    #[envconfig(from = "KAFKA_TOPIC", default = "businesses.fct.update.0")]
    pub topic: String,

    /// Consumer group.
    #[envconfig(from = "KAFKA_GROUP_ID", default = "orquestador-llm-consumer-group")]
    pub group_id: String,

    /// `earliest` or `latest`.
    #[envconfig(from = "KAFKA_OFFSET_RESET", default = "earliest")]
    pub offset_reset: String,

    /// Confluent schema registry for Avro writer schemas. Blank disables lookups.
    #[envconfig(from = "KAFKA_SCHEMA_REGISTRY_URL", default = "http://localhost:8081")]
    pub schema_registry_url: String,
}

impl KafkaConfig {
    /// The registry URL, unless blank.
    #[must_use]
    pub fn registry_url(&self) -> Option<&str> {
        Some(self.schema_registry_url.trim()).filter(|url| !url.is_empty())
    }

    /// Consumer settings for the event source.
    #[must_use]
    pub fn settings(&self) -> KafkaSettings {
        KafkaSettings {
            bootstrap_servers: self.bootstrap_servers.clone(),
            client_id: self.client_id.clone(),
            group_id: self.group_id.clone(),
            topic: self.topic.clone(),
            offset_reset: self.offset_reset.clone(),
        }
    }
}

/// Which cache store to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    /// Shared Redis server.
    Redis,
    /// Local SQLite file.
    Sqlite,
    /// Process memory, lost on restart.
    Memory,
}

impl FromStr for CacheBackend {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(DataError::Configuration(format!(
                "unknown cache backend '{other}'"
            ))),
        }
    }
}

/// Cache store settings.
#[derive(Envconfig, Clone)]
pub struct CacheConfig {
    /// Store kind.
    #[envconfig(from = "CACHE_BACKEND", default = "redis")]
    pub backend: CacheBackend,

    /// Redis connection URL.
    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/0")]
    pub redis_url: String,

    /// SQLite database file.
    #[envconfig(from = "SQLITE_CACHE_PATH", default = "taxline-cache.db")]
    pub sqlite_path: String,
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redis URLs may carry a password.
        f.debug_struct("CacheConfig")
            .field("backend", &self.backend)
            .field("redis_url", &"[REDACTED]")
            .field("sqlite_path", &self.sqlite_path)
            .finish()
    }
}

/// Upstream API settings.
#[derive(Envconfig, Clone)]
pub struct UpstreamConfig {
    /// Monthly sales API base URL.
    #[envconfig(from = "MONTHLY_SALES_API_URL", default = "http://localhost:5001")]
    pub monthly_sales_url: String,

    /// Token for the monthly sales API.
    #[envconfig(from = "BUSINESS_INVOICES_TOKEN")]
    pub monthly_sales_token: Option<String>,

    /// Invoices API base URL.
    #[envconfig(from = "FACTURAS_API_URL", default = "http://localhost:5000")]
    pub invoices_url: String,

    /// Key for the invoices API.
    #[envconfig(from = "FACTURAS_API_KEY", default = "")]
    pub invoices_key: String,

    /// Request timeout for both APIs.
    #[envconfig(from = "UPSTREAM_TIMEOUT_SECS", default = "30")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("monthly_sales_url", &self.monthly_sales_url)
            .field(
                "monthly_sales_token",
                &self.monthly_sales_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("invoices_url", &self.invoices_url)
            .field("invoices_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Language model settings.
#[derive(Envconfig, Clone)]
pub struct LlmConfig {
    /// `ollama` or `openai`.
    #[envconfig(from = "LLM_SERVICE", default = "ollama")]
    pub service: String,

    /// Ollama server URL.
    #[envconfig(from = "OLLAMA_HOST", default = "http://localhost:11434")]
    pub ollama_host: String,

    /// Ollama model name.
    #[envconfig(from = "OLLAMA_MODEL", default = "mistral")]
    pub ollama_model: String,

    /// OpenAI API key.
    #[envconfig(from = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// OpenAI chat model.
    #[envconfig(from = "OPENAI_MODEL", default = "gpt-3.5-turbo")]
    pub openai_model: String,

    /// OpenAI-compatible API base URL.
    #[envconfig(from = "OPENAI_BASE_URL", default = "https://api.openai.com/v1")]
    pub openai_base_url: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("service", &self.service)
            .field("ollama_host", &self.ollama_host)
            .field("ollama_model", &self.ollama_model)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .finish()
    }
}

fn parse_rut_list(raw: &str) -> Vec<Rut> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Rut::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind(), "0.0.0.0:8000");
        assert!(config.kafka.enabled);
        assert_eq!(config.kafka.topic, "businesses.fct.update.0");
        assert_eq!(config.kafka.group_id, "orquestador-llm-consumer-group");
        assert_eq!(
            config.kafka.registry_url(),
            Some("http://localhost:8081")
        );
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.upstream.monthly_sales_token, None);
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
        assert_eq!(config.llm.service, "ollama");
        assert_eq!(
            config.bulk_ruts(),
            vec![
                Rut::new("76111111-1"),
                Rut::new("76222222-2"),
                Rut::new("76637851-k")
            ]
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BIND_PORT", "9090"),
            ("CACHE_BACKEND", "Memory"),
            ("KAFKA_ENABLED", "false"),
            ("LLM_SERVICE", "openai"),
            ("BULK_REFRESH_RUTS", " 1-9 ,, 2-7 "),
        ]);
        assert_eq!(config.port, 9090);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert!(!config.kafka.enabled);
        assert_eq!(config.bulk_ruts(), vec![Rut::new("1-9"), Rut::new("2-7")]);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let env = HashMap::from([("CACHE_BACKEND".to_string(), "memcached".to_string())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[
            ("BUSINESS_INVOICES_TOKEN", "tok-secret"),
            ("FACTURAS_API_KEY", "key-secret"),
            ("OPENAI_API_KEY", "sk-secret"),
            ("REDIS_URL", "redis://:pw-secret@cache:6379/0"),
        ]);
        let debug_str = format!("{config:?}");
        for secret in ["tok-secret", "key-secret", "sk-secret", "pw-secret"] {
            assert!(!debug_str.contains(secret), "{secret} leaked");
        }
    }
}
