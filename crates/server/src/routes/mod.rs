//! API routes

pub mod health;
pub mod messages;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{state::AppState, ws::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Chat REST surface
    let chat_routes = Router::new()
        .route("/chat/messages", get(messages::recent_messages))
        .route("/chat/upload", post(upload::upload))
        .route("/chat/files/:file_ref", get(upload::download));

    // WebSocket routes (identity handled in handler via query parameters)
    let websocket_routes = Router::new().route("/ws/chat", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(chat_routes)
        .merge(websocket_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .with_state(state)
}
