//! API Routes
//!
//! - `/api/chat` - Run a turn through the router
//! - `/api/chat/stream` - Same, relayed as Server-Sent Events
//! - `/api/sessions` - Create and inspect sessions
//! - `/api/sessions/{id}/files` - Upload files as session artifacts
//! - `/api/health` - Health check

pub mod chat;
pub mod files;
pub mod health;
pub mod sessions;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::apply_cors;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let origins = state.config.server.cors_allowed_origins.clone();

    let router = Router::new()
        .merge(chat::router(state.clone()))
        .merge(sessions::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http());

    apply_cors(router, &origins)
}
