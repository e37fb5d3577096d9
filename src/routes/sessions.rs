use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::models::{AppState, SessionCreated, SessionSummary};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .with_state(state)
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let session = state.sessions.create_session().await;
    (StatusCode::CREATED, Json(SessionCreated { session_id: session.id }))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<SessionSummary>> {
    let session = state.sessions.get_session(id).await?;
    Ok(Json(session.summary()))
}
