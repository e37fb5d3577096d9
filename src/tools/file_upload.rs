//! File ingestion tools
//!
//! `list_uploaded_files` enumerates what the user has uploaded (session
//! artifacts plus inline payloads in recent turns) and diffs it against the
//! persisted list of indexed filenames. `index_uploaded_file` uploads one
//! payload into the hosted store unless its content-derived name is already
//! indexed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{string_arg, Tool, ToolContext, ToolError};
use crate::session::Session;
use crate::storage::{content_filename, find_or_create_store, ConfigStore, FileSearchBackend, StoreConfig};
use crate::types::{Blob, FunctionDeclaration};

/// How many trailing session events are scanned for inline uploads
const RECENT_EVENT_WINDOW: usize = 5;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub store_display_name: String,
    pub upload_dir: PathBuf,
    pub upload_timeout: Duration,
    pub poll_interval: Duration,
}

impl IndexSettings {
    pub fn from_config(config: &crate::config::FileStoreConfig) -> Self {
        Self {
            store_display_name: config.display_name.clone(),
            upload_dir: config.upload_dir.clone(),
            upload_timeout: config.upload_timeout,
            poll_interval: config.poll_interval,
        }
    }
}

/// Uploaded files and their indexing status
#[derive(Debug, Clone, PartialEq)]
pub struct FileListing {
    pub all: Vec<String>,
    pub indexed: Vec<String>,
    pub not_indexed: Vec<String>,
    pub store_name: Option<String>,
}

impl FileListing {
    pub fn message(&self) -> String {
        let mut message = format!("Found {} uploaded file(s)", self.all.len());
        if !self.not_indexed.is_empty() {
            message.push_str(&format!(
                ", {} need indexing: {}",
                self.not_indexed.len(),
                self.not_indexed.join(", ")
            ));
        }
        if !self.indexed.is_empty() {
            message.push_str(&format!(", {} already indexed", self.indexed.len()));
        }
        message
    }

    fn to_response(&self) -> Value {
        json!({
            "status": "success",
            "uploaded_files": self.all,
            "indexed_files": self.indexed,
            "not_indexed": self.not_indexed,
            "message": self.message(),
            "store_name": self.store_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Indexed {
        filename: String,
        store_name: String,
        /// Persisted list after this upload
        indexed_files: Vec<String>,
    },
    /// Same content was indexed before; nothing was uploaded
    AlreadyIndexed { filename: String, store_name: String },
}

impl IndexOutcome {
    pub fn filename(&self) -> &str {
        match self {
            IndexOutcome::Indexed { filename, .. } | IndexOutcome::AlreadyIndexed { filename, .. } => filename,
        }
    }

    fn to_response(&self) -> Value {
        match self {
            IndexOutcome::Indexed {
                filename,
                store_name,
                indexed_files,
            } => json!({
                "status": "success",
                "message": format!("Successfully indexed '{}' into the search store", filename),
                "filename": filename,
                "store_name": store_name,
                "total_indexed": indexed_files.len(),
            }),
            IndexOutcome::AlreadyIndexed { filename, store_name } => json!({
                "status": "already_indexed",
                "message": format!("File '{}' is already indexed (same content detected)", filename),
                "filename": filename,
                "store_name": store_name,
            }),
        }
    }
}

/// Inline payloads in the last few events, newest first, keyed by their
/// content-derived filename. Duplicates are dropped.
pub fn recent_inline_uploads(session: &Session) -> Vec<(String, &Blob)> {
    let mut uploads: Vec<(String, &Blob)> = Vec::new();
    for event in session.events.iter().rev().take(RECENT_EVENT_WINDOW) {
        let Some(content) = &event.content else { continue };
        for blob in content.inline_blobs() {
            let name = content_filename(&blob.data, &blob.mime_type);
            if !uploads.iter().any(|(existing, _)| *existing == name) {
                uploads.push((name, blob));
            }
        }
    }
    uploads
}

pub struct FileIndexer {
    /// `None` when no API key is configured
    backend: Option<Arc<dyn FileSearchBackend>>,
    config_store: Arc<dyn ConfigStore>,
    settings: IndexSettings,
}

impl FileIndexer {
    pub fn new(
        backend: Option<Arc<dyn FileSearchBackend>>,
        config_store: Arc<dyn ConfigStore>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            backend,
            config_store,
            settings,
        }
    }

    /// Everything uploaded to the session, split by indexing status.
    ///
    /// Artifacts are listed under their own name and inline payloads under
    /// their derived name. Indexing status is always decided by the derived
    /// name, and an inline payload carrying the same bytes as an artifact is
    /// not listed a second time.
    pub async fn list_files(&self, session: &Session) -> Result<FileListing, ToolError> {
        // (display name, derived name)
        let mut uploads: Vec<(String, String)> = session
            .artifacts
            .iter()
            .map(|(name, blob)| (name.clone(), content_filename(&blob.data, &blob.mime_type)))
            .collect();

        for (derived, blob) in recent_inline_uploads(session) {
            if uploads.iter().any(|(_, existing)| *existing == derived) {
                continue;
            }
            info!(filename = %derived, mime_type = %blob.mime_type, bytes = blob.data.len(), "Found inline upload");
            uploads.push((derived.clone(), derived));
        }

        let config = self.config_store.load_or_default().await?;
        let not_indexed = uploads
            .iter()
            .filter(|(_, derived)| !config.is_indexed(derived))
            .map(|(name, _)| name.clone())
            .collect();

        Ok(FileListing {
            all: uploads.into_iter().map(|(name, _)| name).collect(),
            indexed: config.uploaded_files,
            not_indexed,
            store_name: config.file_search_store_name,
        })
    }

    /// Resolve the bytes behind `filename`: a named artifact first, then an
    /// inline upload with that derived name, then the most recent inline upload.
    fn resolve_payload(session: &Session, filename: &str) -> Option<Blob> {
        if let Some(blob) = session.artifacts.get(filename) {
            info!(filename, "Loaded payload from artifacts");
            return Some(blob.clone());
        }

        let recent = recent_inline_uploads(session);
        if let Some((_, blob)) = recent.iter().find(|(name, _)| name == filename) {
            return Some((*blob).clone());
        }

        recent.first().map(|(name, blob)| {
            info!(requested = filename, using = %name, "Falling back to latest inline upload");
            (*blob).clone()
        })
    }

    async fn ensure_store(&self, backend: &dyn FileSearchBackend, config: &mut StoreConfig) -> Result<String, ToolError> {
        if let Some(name) = &config.file_search_store_name {
            return Ok(name.clone());
        }

        let name = find_or_create_store(backend, &self.settings.store_display_name).await?;
        config.file_search_store_name = Some(name.clone());
        config.uploaded_files.clear();
        config.created_at = Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        self.config_store.save(config).await?;
        Ok(name)
    }

    pub async fn index(&self, session: &Session, filename: &str) -> Result<IndexOutcome, ToolError> {
        let backend = self.backend.as_deref().ok_or(ToolError::MissingCredentials)?;

        let mut config = self.config_store.load_or_default().await?;
        let store_name = self.ensure_store(backend, &mut config).await?;

        let blob = Self::resolve_payload(session, filename).ok_or_else(|| ToolError::FileNotFound {
            filename: filename.to_string(),
            available: session.artifact_names(),
        })?;

        let actual_filename = content_filename(&blob.data, &blob.mime_type);
        info!(original = filename, derived = %actual_filename, "Derived filename from content");

        if config.is_indexed(&actual_filename) {
            return Ok(IndexOutcome::AlreadyIndexed {
                filename: actual_filename,
                store_name,
            });
        }

        tokio::fs::create_dir_all(&self.settings.upload_dir).await?;
        let temp_file = self.settings.upload_dir.join(&actual_filename);
        tokio::fs::write(&temp_file, &blob.data).await?;

        info!(store = %store_name, bytes = blob.data.len(), mime_type = %blob.mime_type, "Uploading to store");
        let upload = backend.upload_file(&store_name, &temp_file, &blob.mime_type).await;
        if let Err(e) = tokio::fs::remove_file(&temp_file).await {
            warn!(path = ?temp_file, error = %e, "Failed to remove temporary upload");
        }
        let mut operation = upload?;

        let step = self.settings.poll_interval.max(MIN_POLL_INTERVAL);
        let mut elapsed = Duration::ZERO;
        while !operation.done && elapsed < self.settings.upload_timeout {
            sleep(step).await;
            elapsed += step;
            operation = backend.get_operation(&operation).await?;
            info!(elapsed_secs = elapsed.as_secs(), "Uploading...");
        }

        if !operation.done {
            return Err(ToolError::UploadTimedOut {
                secs: self.settings.upload_timeout.as_secs(),
            });
        }
        if let Some(error) = operation.error {
            return Err(ToolError::UploadFailed(error.message));
        }

        config.uploaded_files.push(actual_filename.clone());
        self.config_store.save(&config).await?;
        info!(filename = %actual_filename, "Successfully indexed");

        Ok(IndexOutcome::Indexed {
            filename: actual_filename,
            store_name,
            indexed_files: config.uploaded_files,
        })
    }
}

pub struct ListFilesTool {
    indexer: Arc<FileIndexer>,
}

impl ListFilesTool {
    pub fn new(indexer: Arc<FileIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "list_uploaded_files".to_string(),
            description: "Lists the files uploaded in this conversation and which of them are already indexed in the search store.".to_string(),
            parameters: None,
        }
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext<'_>) -> Value {
        match self.indexer.list_files(&ctx.invocation.session).await {
            Ok(listing) => listing.to_response(),
            Err(e) => json!({
                "status": "error",
                "message": e.message("Failed to list files"),
                "uploaded_files": [],
                "indexed_files": [],
                "not_indexed": [],
            }),
        }
    }
}

pub struct IndexFileTool {
    indexer: Arc<FileIndexer>,
}

impl IndexFileTool {
    pub fn new(indexer: Arc<FileIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Tool for IndexFileTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "index_uploaded_file".to_string(),
            description: "Indexes one uploaded file into the search store so it can be searched. Identical content is never indexed twice.".to_string(),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Name of the uploaded file, as returned by list_uploaded_files"
                    }
                },
                "required": ["filename"]
            })),
        }
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Value {
        let filename = match string_arg(&args, "filename") {
            Ok(filename) => filename,
            Err(e) => return json!({"status": "error", "message": e.to_string(), "filename": Value::Null}),
        };

        match self.indexer.index(&ctx.invocation.session, &filename).await {
            Ok(outcome) => {
                if let IndexOutcome::Indexed { filename, indexed_files, .. } = &outcome {
                    ctx.set_state("last_indexed_file", json!(filename));
                    ctx.set_state("indexed_files", json!(indexed_files));
                }
                outcome.to_response()
            }
            Err(e) => {
                warn!(filename = %filename, error = %e, "Indexing failed");
                json!({
                    "status": "error",
                    "message": e.message("Failed to index file"),
                    "filename": filename,
                })
            }
        }
    }
}
