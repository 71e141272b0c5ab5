//! Client for OpenAI-compatible chat completions.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use taxline_core::{DataError, Result};
use tracing::{debug, instrument};

use crate::{LanguageModel, send_json};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Client for `POST {base}/chat/completions`.
///
/// Sends the prompt as a single user message and returns the trimmed content of the
/// first choice.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    /// Create a client against the public API. A blank key counts as missing.
    #[must_use]
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self::with_client(Client::new(), DEFAULT_BASE_URL, api_key, model)
    }

    /// Create a client with a custom HTTP client and base URL.
    #[must_use]
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }

    /// Create a client with a request timeout and a custom base URL.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, api_key, model))
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DataError::Configuration("OPENAI_API_KEY is not set".to_string()))?;

        let url = self.url();
        debug!(url = %url, "OpenAI request");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let reply: ChatResponse =
            send_json(self.client.post(&url).bearer_auth(api_key).json(&body)).await?;

        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }

    fn failure_message(&self, error: &DataError) -> String {
        match error {
            DataError::Configuration(_) => {
                "Error: Falta la configuración de la API de OpenAI.".to_string()
            }
            other => format!("Hubo un error al comunicarse con la API de OpenAI: {other}"),
        }
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_returns_trimmed_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("Authorization", "Bearer sk-test")
                    .json_body(json!({
                        "model": "gpt-3.5-turbo",
                        "messages": [{"role": "user", "content": "¿IVA?"}]
                    }));
                then.status(200).json_body(json!({
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": "  19%  \n"}},
                        {"index": 1, "message": {"role": "assistant", "content": "otro"}}
                    ]
                }));
            })
            .await;

        let client = OpenAiClient::with_client(
            Client::new(),
            server.base_url(),
            Some("sk-test".into()),
            DEFAULT_MODEL,
        );
        assert_eq!(client.complete("¿IVA?").await.unwrap(), "19%");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let client = OpenAiClient::with_client(Client::new(), server.base_url(), None, DEFAULT_MODEL);
        assert!(matches!(
            client.complete("hola").await,
            Err(DataError::Configuration(_))
        ));
        assert_eq!(
            client.answer("hola").await,
            "Error: Falta la configuración de la API de OpenAI."
        );
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_api_error_becomes_answer() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("rate limited");
            })
            .await;

        let client = OpenAiClient::with_client(
            Client::new(),
            server.base_url(),
            Some("sk-test".into()),
            DEFAULT_MODEL,
        );
        let reply = client.answer("hola").await;
        assert!(reply.starts_with("Hubo un error al comunicarse con la API de OpenAI:"));
        assert!(reply.contains("429"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = OpenAiClient::new(Some("sk-very-secret".into()), DEFAULT_MODEL);
        let debug_str = format!("{client:?}");
        assert!(!debug_str.contains("sk-very-secret"));
    }
}
