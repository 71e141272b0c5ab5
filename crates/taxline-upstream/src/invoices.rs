//! Client for the invoices API.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use taxline_core::{
    DataError, DataProvider, DateRange, InvoicePage, InvoiceProvider, InvoiceQuery,
    InvoiceSummary, Result, Rut,
};
use tracing::{debug, instrument};

use crate::{http_client, join_url, transport};

/// Date format of the `start_date`/`end_date` query parameters.
const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Client for `GET {base}/api/facturas` and `GET {base}/api/facturas/resumen`.
///
/// Authenticates with the `X-API-Key` header. Responses are decoded into the core
/// invoice types; individual invoice documents stay opaque JSON.
#[derive(Clone)]
pub struct InvoicesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for InvoicesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoicesClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl InvoicesClient {
    /// Create a new client.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    /// Create a new client whose requests time out after `timeout`.
    ///
    /// # Errors
    /// Returns [`DataError::Configuration`] if the HTTP client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, base_url, api_key))
    }

    /// Create a new client with a custom HTTP client.
    #[must_use]
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Make a GET request and decode the JSON body.
    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = join_url(&self.base_url, path);
        debug!(url = %url, "Invoices request");

        let response = self
            .client
            .get(&url)
            .query(params)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DataError::Transport(format!("HTTP {status}: {text}")));
        }

        let text = response.text().await.map_err(transport)?;
        serde_json::from_str(&text).map_err(|e| DataError::UpstreamProtocol(format!("{e}: {text}")))
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(QUERY_DATE_FORMAT).to_string()
}

fn push_range(params: &mut Vec<(&'static str, String)>, range: &DateRange) {
    if let Some(start) = range.start {
        params.push(("start_date", format_date(start)));
    }
    if let Some(end) = range.end {
        params.push(("end_date", format_date(end)));
    }
}

fn page_params(rut: &Rut, query: &InvoiceQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("rut", rut.to_string()),
        ("page", query.page.to_string()),
        ("per_page", query.per_page.to_string()),
    ];
    push_range(&mut params, &query.range);
    params
}

fn summary_params(rut: &Rut, range: &DateRange) -> Vec<(&'static str, String)> {
    let mut params = vec![("rut", rut.to_string())];
    push_range(&mut params, range);
    params
}

impl DataProvider for InvoicesClient {
    fn name(&self) -> &str {
        "invoices"
    }

    fn description(&self) -> &str {
        "Paginated invoice documents and invoice statistics"
    }
}

#[async_trait]
impl InvoiceProvider for InvoicesClient {
    #[instrument(skip(self), fields(rut = %rut))]
    async fn fetch_invoice_page(&self, rut: &Rut, query: &InvoiceQuery) -> Result<InvoicePage> {
        self.get("api/facturas", &page_params(rut, query)).await
    }

    #[instrument(skip(self), fields(rut = %rut))]
    async fn fetch_invoice_summary(&self, rut: &Rut, range: &DateRange) -> Result<InvoiceSummary> {
        self.get("api/facturas/resumen", &summary_params(rut, range))
            .await
    }
}
