use axum::{extract::State, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_configured = match state.config_store.load().await {
        Ok(config) => config.is_some_and(|c| c.file_search_store_name.is_some()),
        Err(e) => {
            warn!(error = %e, "Could not read file store config");
            false
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        store_configured,
    })
}
