use crate::api::AppState;
use crate::api::schemas::messages::SendMessageRequest;
use crate::error::Result;
use crate::services::message_service::NewMessage;
use axum::{Json, extract::State, response::IntoResponse};

/// Stores a message composed by the local user and broadcasts it.
///
/// # Errors
/// Returns `AppError::BadRequest` if the conversation or body is blank.
pub async fn send_message(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state.message_service.send(NewMessage::from(payload)).await?;
    Ok(Json(message))
}

impl From<SendMessageRequest> for NewMessage {
    fn from(request: SendMessageRequest) -> Self {
        Self {
            conversation_id: request.conversation_id,
            display_name: request.display_name,
            body: request.body_text,
            client_id: request.client_id,
        }
    }
}
