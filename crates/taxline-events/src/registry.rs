//! Confluent schema registry lookups.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use apache_avro::Schema;
use reqwest::Client;
use serde::Deserialize;
use taxline_core::{DataError, Result};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Default request timeout for registry lookups.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves writer schemas by id with `GET {base}/schemas/ids/{id}`.
///
/// Schemas are immutable per id, so each one is fetched once and kept for the life of
/// the client.
pub struct SchemaRegistry {
    client: Client,
    base_url: String,
    schemas: RwLock<HashMap<u32, Arc<Schema>>>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
}

impl SchemaRegistry {
    /// Create a client with the default timeout.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REGISTRY_TIMEOUT)
            .build()
            .map_err(|e| DataError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Base URL of the registry.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The writer schema registered under `id`.
    ///
    /// # Errors
    /// - [`DataError::Transport`] if the registry cannot be reached or answers 5xx
    /// - [`DataError::UpstreamProtocol`] for any other non-2xx status, or a body or
    ///   schema that does not parse
    #[instrument(skip(self), fields(registry = %self.base_url))]
    pub async fn schema(&self, id: u32) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schemas.read().await.get(&id) {
            return Ok(Arc::clone(schema));
        }

        let url = format!("{}/schemas/ids/{id}", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "Fetching writer schema");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DataError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DataError::Transport(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DataError::UpstreamProtocol(format!(
                "schema {id}: HTTP {status}: {text}"
            )));
        }

        let body: SchemaResponse = response
            .json()
            .await
            .map_err(|e| DataError::UpstreamProtocol(format!("schema {id}: {e}")))?;
        let schema = Schema::parse_str(&body.schema)
            .map_err(|e| DataError::UpstreamProtocol(format!("schema {id}: {e}")))?;

        let schema = Arc::new(schema);
        self.schemas
            .write()
            .await
            .insert(id, Arc::clone(&schema));
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    const TINY: &str = r#"{"type": "record", "name": "Tiny", "fields": [{"name": "rut", "type": "string"}]}"#;

    #[tokio::test]
    async fn test_schema_is_fetched_once_per_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/schemas/ids/8");
                then.status(200).json_body(json!({ "schema": TINY }));
            })
            .await;

        let registry = SchemaRegistry::with_client(Client::new(), server.base_url());
        let first = registry.schema(8).await.unwrap();
        let second = registry.schema(8).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_protocol_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/schemas/ids/99");
                then.status(404)
                    .json_body(json!({"error_code": 40403, "message": "Schema not found"}));
            })
            .await;

        let registry = SchemaRegistry::with_client(Client::new(), server.base_url());
        assert!(matches!(
            registry.schema(99).await,
            Err(DataError::UpstreamProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_transport_error() {
        let registry = SchemaRegistry::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(registry.schema(1).await, Err(DataError::Transport(_))));
    }
}
