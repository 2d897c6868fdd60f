use crate::bus::CommandPublisher;
use crate::hub::BroadcastHub;
use crate::subscription::ConnectionManager;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state for WebSocket handler
pub struct WsAppState {
    pub hub: Arc<BroadcastHub>,
    /// None disables client commands
    pub commands: Option<CommandPublisher>,
    pub delivery_timeout: Duration,
}

/// GET /ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    let manager = ConnectionManager::new(state.commands.clone(), state.delivery_timeout);
    manager.handle(socket, Arc::clone(&state.hub)).await;
}
