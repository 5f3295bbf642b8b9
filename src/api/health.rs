use crate::api::MgmtState;
use crate::api::schemas::health::{HealthResponse, PurgeResponse};
use crate::error::Result;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks that the message store answers.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (status_code, store_status) = match state.health_service.check_store().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, component = "store", "Readiness probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
    };

    let response = HealthResponse { status: store_status.to_string(), store: store_status.to_string() };

    (status_code, Json(response))
}

/// Deletes every stored message.
///
/// # Errors
/// Returns `AppError::Database` if the store cannot be purged.
pub async fn purge_messages(State(state): State<MgmtState>) -> Result<impl IntoResponse> {
    let deleted = state.health_service.purge_messages().await?;
    Ok(Json(PurgeResponse { deleted }))
}
