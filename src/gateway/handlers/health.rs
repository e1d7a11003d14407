//! Health check handler

use std::sync::Arc;

use axum::extract::State;
use chrono::Utc;
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};

/// Health check response data
#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    /// Ledger backend in use
    #[schema(example = "postgres")]
    pub backend: String,
}

/// Health check endpoint
///
/// Pings the ledger store. The failure reason is logged, never returned.
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms, backend}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    if let Err(e) = state.ledger.health_check().await {
        tracing::error!("[HEALTH] {} ledger check failed: {}", state.ledger.name(), e);
        return ApiError::service_unavailable("unavailable").into_err();
    }
    ok(HealthResponse {
        timestamp_ms: Utc::now().timestamp_millis(),
        backend: state.ledger.name().to_string(),
    })
}
