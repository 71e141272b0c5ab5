//! Client for a local Ollama server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taxline_core::{DataError, Result};
use tracing::{debug, instrument};

use crate::{LanguageModel, send_json};

/// Generation can be slow on CPU-only hosts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Client for `POST {host}/api/generate` with streaming disabled.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    /// Create a client with the default timeout.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(host, model, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn with_timeout(
        host: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, host, model))
    }

    /// Create a client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            model: model.into(),
        }
    }

    /// Model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.host.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = self.url();
        debug!(url = %url, "Ollama request");

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let reply: GenerateResponse = send_json(self.client.post(&url).json(&body)).await?;
        Ok(reply.response)
    }

    fn failure_message(&self, error: &DataError) -> String {
        match error {
            DataError::Transport(_) => format!(
                "Error: No se pudo conectar al servicio de Ollama en {}. Verifica que esté corriendo y accesible.",
                self.host
            ),
            _ => "Hubo un error inesperado al comunicarse con Ollama.".to_string(),
        }
    }
}

// ============================================================================
// Ollama API Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}
