use crate::api::AppState;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    http::Extensions,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Subscribing before the upgrade means events published right after the handshake are delivered.
    let subscription = state.gateway_service.subscribe();
    let gateway_service = state.gateway_service.clone();
    let shutdown_rx = state.shutdown_rx.clone();

    ws.on_upgrade(move |socket| async move {
        gateway_service.handle_socket(socket, subscription, request_id, shutdown_rx).await;
    })
}
