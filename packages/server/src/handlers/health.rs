use axum::{Json, extract::State, http::StatusCode};
use tracing::warn;

use crate::models::health::HealthResponse;
use crate::state::AppState;

/// Report whether the backends answer.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "health",
    summary = "Backend health",
    description = "Pings the metadata database and the text store. No authentication.",
    responses(
        (status = 200, description = "All backends reachable", body = HealthResponse),
        (status = 503, description = "At least one backend unreachable", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Metadata database ping failed");
            false
        }
    };
    let text_store = match state.router.ping_text_store().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Text store ping failed");
            false
        }
    };

    let healthy = database && text_store;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            database,
            text_store,
        }),
    )
}
