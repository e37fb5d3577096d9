use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::post,
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::models::{AppState, StoredArtifact, UploadResponse};
use crate::storage::content_filename;
use crate::types::{AppError, AppResult, Blob};

const MAX_UPLOAD_BODY: usize = 25 * 1024 * 1024;
const FALLBACK_MIME: &str = "application/octet-stream";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/{id}/files", post(upload_files))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY))
        .with_state(state)
}

/// Declared content type unless it is missing or generic, then a guess from the filename
fn resolve_mime(declared: Option<&str>, filename: Option<&str>) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != FALLBACK_MIME => mime.to_string(),
        _ => filename
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .unwrap_or(FALLBACK_MIME)
            .to_string(),
    }
}

async fn upload_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    state.sessions.get_session(id).await?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("invalid multipart body: {}", e)))?
    {
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty());
        let mime_type = resolve_mime(field.content_type(), filename.as_deref());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("failed to read upload: {}", e)))?;

        let derived = content_filename(&data, &mime_type);
        let name = filename.unwrap_or_else(|| derived.clone());
        info!(session_id = %id, name = %name, mime_type = %mime_type, bytes = data.len(), "Received upload");

        state
            .sessions
            .save_artifact(id, &name, Blob::new(mime_type.clone(), data.to_vec()))
            .await?;

        files.push(StoredArtifact {
            name,
            mime_type,
            size: data.len(),
            content_filename: derived,
        });
    }

    if files.is_empty() {
        return Err(AppError::InvalidRequest("no files in upload".to_string()));
    }

    Ok(Json(UploadResponse { session_id: id, files }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mime() {
        assert_eq!(resolve_mime(Some("application/pdf"), Some("a.bin")), "application/pdf");
        assert_eq!(resolve_mime(Some(FALLBACK_MIME), Some("notes.txt")), "text/plain");
        assert_eq!(resolve_mime(None, Some("photo.png")), "image/png");
        assert_eq!(resolve_mime(None, None), FALLBACK_MIME);
    }
}
