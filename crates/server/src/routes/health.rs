use axum::Json;
use gantt_api::HealthResponse;

/// GET /api/health — liveness check used by the client connectivity probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
