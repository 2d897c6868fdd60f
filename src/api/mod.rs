// HTTP and WebSocket APIs

pub mod query;
pub mod websocket;

pub use query::{create_query_router, QueryAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Create CORS layer with permissive settings for browser dashboards
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Full HTTP surface: query API, WebSocket endpoint and CORS
pub fn create_app(query: Arc<QueryAppState>, ws: Arc<WsAppState>) -> Router {
    create_query_router(query)
        .merge(create_ws_router(ws))
        .layer(create_cors_layer())
}
