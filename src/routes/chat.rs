use axum::{
    extract::{DefaultBodyLimit, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{stream, Stream, StreamExt};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::models::{AppState, ChatRequest, ChatResponse};
use crate::types::{AppError, AppResult, Blob, Content, Part};

/// Inline attachments arrive base64-encoded inside the JSON body
const MAX_CHAT_BODY: usize = 32 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/chat/stream", post(post_chat_stream))
        .layer(DefaultBodyLimit::max(MAX_CHAT_BODY))
        .with_state(state)
}

/// Resolve the session and turn the request into a user turn. Named
/// attachments are also saved as session artifacts.
async fn prepare_turn(state: &AppState, request: ChatRequest) -> AppResult<(Uuid, Content)> {
    if request.message.trim().is_empty() && request.attachments.is_empty() {
        return Err(AppError::InvalidRequest(
            "message or attachments required".to_string(),
        ));
    }

    let session = state.sessions.get_or_create(request.session_id).await?;

    let mut parts = Vec::with_capacity(request.attachments.len() + 1);
    if !request.message.trim().is_empty() {
        parts.push(Part::text(request.message));
    }

    for (idx, attachment) in request.attachments.into_iter().enumerate() {
        let data = STANDARD
            .decode(attachment.data.as_bytes())
            .map_err(|e| AppError::InvalidRequest(format!("attachment {}: invalid base64: {}", idx, e)))?;
        let blob = Blob::new(attachment.mime_type, data);

        if let Some(name) = attachment.filename.filter(|n| !n.trim().is_empty()) {
            state.sessions.save_artifact(session.id, &name, blob.clone()).await?;
        }
        parts.push(Part::inline(blob));
    }

    Ok((session.id, Content::user(parts)))
}

pub async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    info!(
        session_id = ?request.session_id,
        attachments = request.attachments.len(),
        "Received chat request"
    );

    let (session_id, turn) = prepare_turn(&state, request).await?;
    let (destination, events) = state.runner.run_turn_collect(session_id, turn).await?;

    info!(%session_id, %destination, events = events.len(), "Chat turn complete");

    Ok(Json(ChatResponse {
        session_id,
        destination,
        events,
    }))
}

/// Relay the turn as SSE: `route`, one `event` per agent event, then `done`
pub async fn post_chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>> {
    info!(session_id = ?request.session_id, "Received streaming chat request");

    let (session_id, turn) = prepare_turn(&state, request).await?;
    let turn = state.runner.run_turn(session_id, turn).await?;

    let route = SseEvent::default().event("route").json_data(json!({
        "session_id": session_id,
        "destination": turn.destination,
    }));
    let done = SseEvent::default()
        .event("done")
        .json_data(json!({ "session_id": session_id }));

    let events = turn
        .events
        .map(|event| SseEvent::default().event("event").json_data(&event));

    let body = stream::once(async move { route })
        .chain(events)
        .chain(stream::once(async move { done }));

    Ok(Sse::new(body).keep_alive(KeepAlive::default()))
}
