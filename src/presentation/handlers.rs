// HTTP request handlers
use crate::application::provider_registry::ProviderError;
use crate::domain::dashboard::DashboardSchema;
use crate::domain::metric::MetricValue;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::Json;
use axum::extract::{Path, State};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Fetch a dashboard schema by its code
pub async fn get_screen(
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSchema>, ApiError> {
    state
        .dashboard_service
        .get_by_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("dashboard `{}`", code)))
}

/// Create or replace a dashboard schema
pub async fn save_screen(
    State(state): State<Arc<AppState>>,
    Json(schema): Json<DashboardSchema>,
) -> Result<Json<DashboardSchema>, ApiError> {
    Ok(Json(state.dashboard_service.save(schema).await?))
}

/// Current value of one metric source, for poll-mode widgets
pub async fn get_metric(
    Path(source): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricValue>, ApiError> {
    let provider = state.registry.resolve_source(&source)?;
    let value = tokio::time::timeout(state.provider_timeout, provider.produce())
        .await
        .map_err(|_| ProviderError::Timeout(state.provider_timeout))??;
    Ok(Json(value))
}
