use crate::api::AppState;
use axum::{
    extract::{State, ws::WebSocketUpgrade},
    http::Extensions,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

/// Upgrades to a socket session. Identity is established by the `join` frame, not the handshake.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    extensions: Extensions,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let gateway = state.gateway_service.clone();
    let shutdown_rx = state.shutdown_rx.clone();
    let max_frame_bytes = state.config.websocket.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| async move { gateway.handle_socket(socket, request_id, shutdown_rx).await })
}
