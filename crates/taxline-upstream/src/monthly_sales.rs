//! Client for the monthly sales API.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use taxline_core::{DataError, DataProvider, MonthlyDataProvider, MonthlyRecord, Result, Rut};
use tracing::{debug, instrument};

use crate::{http_client, segment_url, transport};

/// Value the upstream puts in `status` on success.
const STATUS_OK: &str = "ok";

/// Client for `GET {base}/business/{rut}/monthly_sales`.
///
/// Performs exactly one request per fetch and never retries. Without a token every
/// fetch fails with [`DataError::Configuration`] before touching the network.
#[derive(Clone)]
pub struct MonthlySalesClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for MonthlySalesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonthlySalesClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl MonthlySalesClient {
    /// Create a new client. A blank token counts as missing.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    /// Create a new client whose requests time out after `timeout`.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, base_url, token))
    }

    /// Create a new client with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Returns true if a token is configured.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Build the endpoint URL for a business. The rut is one encoded path segment.
    fn url(&self, rut: &Rut) -> Result<Url> {
        segment_url(&self.base_url, &["business", rut.as_str(), "monthly_sales"])
    }
}

impl DataProvider for MonthlySalesClient {
    fn name(&self) -> &str {
        "monthly-sales"
    }

    fn description(&self) -> &str {
        "Monthly purchase and sales totals per business"
    }
}

#[async_trait]
impl MonthlyDataProvider for MonthlySalesClient {
    #[instrument(skip(self), fields(rut = %rut))]
    async fn try_fetch_monthly_data(&self, rut: &Rut) -> Result<Vec<MonthlyRecord>> {
        let token = self.token.as_deref().ok_or_else(|| {
            DataError::Configuration("monthly sales API token is not set".to_string())
        })?;

        let url = self.url(rut)?;
        debug!(url = %url, "Monthly sales request");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DataError::Transport(format!("HTTP {status}: {text}")));
        }

        let text = response.text().await.map_err(transport)?;
        parse_monthly_sales(&text)
    }
}

/// Envelope of the monthly sales response.
#[derive(Debug, Deserialize)]
struct MonthlySalesResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_last_months: Option<Vec<MonthlyRecord>>,
}

/// Validates the envelope and extracts the records.
fn parse_monthly_sales(text: &str) -> Result<Vec<MonthlyRecord>> {
    let body: MonthlySalesResponse = serde_json::from_str(text)
        .map_err(|e| DataError::UpstreamProtocol(format!("{e}: {text}")))?;

    match body {
        MonthlySalesResponse {
            status: Some(status),
            total_last_months: Some(records),
        } if status == STATUS_OK => Ok(records),
        _ => Err(DataError::UpstreamProtocol(format!(
            "expected status \"ok\" with total_last_months: {text}"
        ))),
    }
}
