use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use spendlog_core::NewExpense;

use crate::{
    analytics::{AnalyticsService, Breakdown},
    error::AppError,
    expenses::ExpenseService,
    storage::{ExpenseStore, StorageError},
};

#[derive(Clone)]
pub struct AppState {
    pub expenses: Arc<ExpenseService>,
    pub analytics: Arc<AnalyticsService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn ExpenseStore>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            expenses: Arc::new(ExpenseService::new(store.clone())),
            analytics: Arc::new(AnalyticsService::new(store)),
            metrics,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Serialize)]
struct Detail {
    detail: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Storage(StorageError::InvalidDate(d)) => {
                ApiError::unprocessable(format!("invalid date '{}', expected YYYY-MM-DD", d))
            }
            AppError::Storage(StorageError::InvalidAmount(a)) => {
                ApiError::unprocessable(format!("invalid amount '{}'", a))
            }
            AppError::InvalidInput(msg) => ApiError::unprocessable(msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "Failed to access the expense database.".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Detail { detail: self.detail })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/expenses/:date", get(get_expenses).post(replace_expenses))
        .route("/analytics/", post(analytics))
        .route("/analytics", post(analytics))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), AppError> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// Storage calls block; keep them off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

fn record<T>(route: &'static str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    metrics::increment_counter!("spendlog_http_requests_total", "route" => route);
    if result.is_err() {
        metrics::increment_counter!("spendlog_http_failures_total", "route" => route);
    }
    result
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Expense Tracking API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_expenses(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<NewExpense>>, ApiError> {
    tracing::debug!(%date, "GET /expenses");
    let service = state.expenses.clone();
    let result = blocking(move || service.fetch_day(&date))
        .await
        .map(|records| Json(records.iter().map(NewExpense::from).collect()))
        .map_err(ApiError::from);
    record("get_expenses", result)
}

async fn replace_expenses(
    State(state): State<AppState>,
    Path(date): Path<String>,
    body: Result<Json<Vec<NewExpense>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = async {
        let Json(entries) = body?;
        tracing::debug!(%date, entries = entries.len(), "POST /expenses");
        let service = state.expenses.clone();
        blocking(move || service.replace_day(&date, entries)).await?;
        Ok::<_, ApiError>(Json(json!({ "message": "Expenses updated successfully" })))
    }
    .await;
    record("replace_expenses", result)
}

async fn analytics(
    State(state): State<AppState>,
    body: Result<Json<DateRange>, JsonRejection>,
) -> Result<Json<Breakdown>, ApiError> {
    let result = async {
        let Json(range) = body?;
        tracing::debug!(start = %range.start_date, end = %range.end_date, "POST /analytics");
        let service = state.analytics.clone();
        let breakdown = blocking(move || service.analyze(&range.start_date, &range.end_date)).await?;
        Ok::<_, ApiError>(Json(breakdown))
    }
    .await;
    record("analytics", result)
}
