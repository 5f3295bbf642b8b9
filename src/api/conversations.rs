use crate::api::AppState;
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};

pub async fn list_conversations(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conversations = state.conversation_service.list().await?;
    Ok(Json(conversations))
}
