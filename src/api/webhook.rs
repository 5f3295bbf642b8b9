use crate::api::AppState;
use crate::error::Result;
use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse};

/// Receives a provider notification, stores what it carries and broadcasts it.
///
/// # Errors
/// Returns `AppError::MalformedPayload` or `AppError::Database`, both rendered as 500.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    state.ingest_service.ingest_webhook(&body).await?;
    Ok(StatusCode::OK)
}
