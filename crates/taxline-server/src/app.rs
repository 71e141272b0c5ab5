//! HTTP routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use taxline::{
    BulkRefreshJob, BusinessDataCache, DateRange, InvoiceCache, InvoicePage, InvoiceQuery,
    InvoiceSummary, LedgerKind, Rut,
};
use taxline_llm::{LanguageModel, build_vat_prompt};

const BAD_ADMIN_REQUEST: &str = "Formato incorrecto. Proporciona 'rut' para actualizar un negocio o 'all': true para actualizar todos.";

/// Shared handles for the request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Monthly data read through the cache.
    pub business: Arc<BusinessDataCache>,
    /// Invoice pages and summaries read through the cache.
    pub invoices: Arc<InvoiceCache>,
    /// Model answering questions.
    pub llm: Arc<dyn LanguageModel>,
    /// Job behind `{"all": true}`.
    pub bulk: BulkRefreshJob,
}

/// Builds the service router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/preguntar", post(ask))
        .route("/admin/update-cache", post(update_cache))
        .route("/facturas/:rut", get(invoice_page))
        .route("/facturas/:rut/resumen", get(invoice_summary))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Body of `POST /preguntar`.
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    /// Business the question is about.
    pub rut: Rut,
    /// The question, in natural language.
    #[serde(default)]
    pub pregunta: String,
}

/// Reply of `POST /preguntar`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionResponse {
    /// Business the question was about.
    pub rut: Rut,
    /// The question as received.
    pub pregunta: String,
    /// The model's answer, or a readable error.
    pub respuesta: String,
}

fn bad_request(rejection: &JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text() })),
    )
        .into_response()
}

#[instrument(skip_all)]
async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected question body");
            return bad_request(&rejection);
        }
    };

    let records = state.business.get_or_fetch(&request.rut).await;
    let purchases = records
        .as_deref()
        .map(|r| LedgerKind::Purchases.project_all(r));
    let sales = records.as_deref().map(|r| LedgerKind::Sales.project_all(r));

    let prompt = build_vat_prompt(
        &request.rut,
        purchases.as_deref(),
        sales.as_deref(),
        &request.pregunta,
    );
    info!(rut = %request.rut, model = state.llm.name(), "Routing question to model");
    let respuesta = state.llm.answer(&prompt).await;

    Json(QuestionResponse {
        rut: request.rut,
        pregunta: request.pregunta,
        respuesta,
    })
    .into_response()
}

/// What an admin update body asks for.
#[derive(Debug, PartialEq, Eq)]
enum UpdateTarget {
    One(Rut),
    All,
}

fn update_target(body: &Value) -> Option<UpdateTarget> {
    if let Some(rut) = body.get("rut").and_then(Value::as_str) {
        let rut = Rut::new(rut);
        return (!rut.is_blank()).then_some(UpdateTarget::One(rut));
    }
    (body.get("all") == Some(&Value::Bool(true))).then_some(UpdateTarget::All)
}

/// Always answers 200; the refresh itself runs on a detached task.
#[instrument(skip_all)]
async fn update_cache(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Json<Value> {
    let target = payload.ok().and_then(|Json(body)| update_target(&body));

    match target {
        Some(UpdateTarget::One(rut)) => {
            info!(rut = %rut, "Scheduling cache refresh");
            let message = format!("Actualizando caché para RUT {rut} en background.");
            let business = Arc::clone(&state.business);
            let invoices = Arc::clone(&state.invoices);
            tokio::spawn(async move {
                business.refresh(&rut).await;
                if let Err(e) = invoices.invalidate(&rut).await {
                    warn!(rut = %rut, error = %e, "Invoice cache invalidation failed");
                }
            });
            Json(json!({ "message": message }))
        }
        Some(UpdateTarget::All) => {
            info!(count = state.bulk.ruts().len(), "Scheduling bulk cache refresh");
            drop(state.bulk.spawn());
            Json(json!({ "message": "Actualizando caché para todos los negocios en background." }))
        }
        None => Json(json!({ "error": BAD_ADMIN_REQUEST })),
    }
}

/// Query string of the invoice routes.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceParams {
    /// 1-based page, default 1.
    pub page: Option<u32>,
    /// Page size, default 100.
    pub per_page: Option<u32>,
    /// First day included, `YYYY-MM-DD`.
    pub start_date: Option<NaiveDate>,
    /// Last day included, `YYYY-MM-DD`.
    pub end_date: Option<NaiveDate>,
}

impl InvoiceParams {
    fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    fn query(&self) -> InvoiceQuery {
        let defaults = InvoiceQuery::default();
        InvoiceQuery {
            page: self.page.filter(|p| *p > 0).unwrap_or(defaults.page),
            per_page: self.per_page.filter(|p| *p > 0).unwrap_or(defaults.per_page),
            range: self.range(),
        }
    }
}

async fn invoice_page(
    State(state): State<AppState>,
    Path(rut): Path<Rut>,
    Query(params): Query<InvoiceParams>,
) -> Json<InvoicePage> {
    Json(state.invoices.page(&rut, &params.query()).await)
}

async fn invoice_summary(
    State(state): State<AppState>,
    Path(rut): Path<Rut>,
    Query(params): Query<InvoiceParams>,
) -> Json<InvoiceSummary> {
    Json(state.invoices.summary(&rut, &params.range()).await)
}
