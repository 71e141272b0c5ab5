#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/taxline/taxline/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Language model clients for taxline.
//!
//! - [`LanguageModel`] - Prompt completion
//! - [`OllamaClient`] - Ollama backend
//! - [`OpenAiClient`] - OpenAI backend
//! - [`build_vat_prompt`] - Prompt rendering

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::str::FromStr;
use taxline_core::{DataError, Result};
use tracing::{error, warn};

/// Ollama client.
pub mod ollama;
/// OpenAI client.
pub mod openai;
/// Prompt rendering.
pub mod prompt;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use prompt::{build_vat_prompt, format_amount};

/// A model that completes prompts.
#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    /// Backend name for logs (e.g. "ollama").
    fn name(&self) -> &str;

    /// Sends the prompt and returns the model's reply.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Reply shown to the user when [`LanguageModel::complete`] fails.
    fn failure_message(&self, _error: &DataError) -> String {
        format!("Hubo un error inesperado al comunicarse con {}.", self.name())
    }

    /// Completes the prompt, turning any failure into a readable reply.
    async fn answer(&self, prompt: &str) -> String {
        match self.complete(prompt).await {
            Ok(reply) => reply,
            Err(e @ DataError::Configuration(_)) => {
                error!(model = self.name(), error = %e, "Language model misconfigured");
                self.failure_message(&e)
            }
            Err(e) => {
                warn!(model = self.name(), error = %e, "Language model request failed");
                self.failure_message(&e)
            }
        }
    }
}

/// Sends a prepared request and decodes the JSON reply.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| DataError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(DataError::Transport(format!("HTTP {status}: {text}")));
    }

    let text = response
        .text()
        .await
        .map_err(|e| DataError::Transport(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| DataError::UpstreamProtocol(format!("{e}: {text}")))
}

/// Which language model backend to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmBackend {
    /// Local Ollama server.
    Ollama,
    /// OpenAI chat completions.
    OpenAi,
}

impl FromStr for LlmBackend {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(DataError::Configuration(format!(
                "unknown LLM service '{other}'"
            ))),
        }
    }
}

/// Stand-in for a backend name that is not recognized.
///
/// Every completion fails, and [`LanguageModel::answer`] tells the user the service
/// is not configured.
#[derive(Clone, Debug)]
pub struct UnconfiguredModel {
    service: String,
}

impl UnconfiguredModel {
    /// Create a stand-in for the given configured name.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    fn name(&self) -> &str {
        &self.service
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(DataError::Configuration(format!(
            "LLM service '{}' is not supported",
            self.service
        )))
    }

    fn failure_message(&self, _error: &DataError) -> String {
        format!(
            "Error: Servicio LLM '{}' no configurado correctamente.",
            self.service
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!(" ollama ".parse::<LlmBackend>().unwrap(), LlmBackend::Ollama);
        assert!(matches!(
            "claude".parse::<LlmBackend>(),
            Err(DataError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_model_answers_with_error_text() {
        let model = UnconfiguredModel::new("bard");
        assert!(model.complete("hola").await.is_err());
        assert_eq!(
            model.answer("hola").await,
            "Error: Servicio LLM 'bard' no configurado correctamente."
        );
    }
}
