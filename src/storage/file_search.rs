//! File Search store client
//!
//! Thin wrapper around the Gemini File Search REST endpoints:
//! - list / create stores (`v1beta/fileSearchStores`)
//! - resumable upload into a store (`upload/v1beta/{store}:uploadToFileSearchStore`)
//! - long-running operation polling (`v1beta/{operation}`)

use crate::llm::google::{describe_error, API_KEY_HEADER};
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchStore {
    /// Resource name, e.g. `fileSearchStores/abc123`
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// int64 counters arrive as JSON strings
    #[serde(default)]
    pub active_documents_count: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: String,
}

/// Handle to a long-running upload/import operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOperation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
}

/// Hosted search-store operations the ingestion tools depend on
#[async_trait]
pub trait FileSearchBackend: Send + Sync {
    async fn list_stores(&self) -> AppResult<Vec<FileSearchStore>>;

    async fn create_store(&self, display_name: &str) -> AppResult<FileSearchStore>;

    async fn upload_file(&self, store_name: &str, path: &Path, mime_type: &str) -> AppResult<UploadOperation>;

    async fn get_operation(&self, operation: &UploadOperation) -> AppResult<UploadOperation>;
}

/// Return the store named `display_name`, creating it when none exists.
/// The first store with a matching display name wins.
pub async fn find_or_create_store(backend: &dyn FileSearchBackend, display_name: &str) -> AppResult<String> {
    let stores = backend.list_stores().await?;
    if let Some(store) = stores
        .into_iter()
        .find(|s| s.display_name.as_deref() == Some(display_name))
    {
        info!(
            store = %store.name,
            documents = store.active_documents_count.as_deref().unwrap_or("0"),
            "Found existing file search store"
        );
        return Ok(store.name);
    }

    info!(display_name, "Store not found, creating new store");
    let store = backend.create_store(display_name).await?;
    info!(store = %store.name, "Store created");
    Ok(store.name)
}

pub struct GoogleFileSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListStoresResponse {
    #[serde(default)]
    file_search_stores: Vec<FileSearchStore>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoreRequest<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata<'a> {
    display_name: &'a str,
    mime_type: &'a str,
}

impl GoogleFileSearch {
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn check(response: reqwest::Response, what: &str) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::FileSearchApi(format!("{} failed: {}", what, describe_error(status, &body))))
    }

    fn transport(what: &str) -> impl FnOnce(reqwest::Error) -> AppError + '_ {
        move |e| AppError::FileSearchApi(format!("{} request failed: {}", what, e))
    }
}

#[async_trait]
impl FileSearchBackend for GoogleFileSearch {
    async fn list_stores(&self) -> AppResult<Vec<FileSearchStore>> {
        let url = format!("{}/v1beta/fileSearchStores", self.base_url);
        let mut stores = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(Self::transport("List stores"))?;
            let page: ListStoresResponse = Self::check(response, "List stores")
                .await?
                .json()
                .await
                .map_err(Self::transport("List stores"))?;

            stores.extend(page.file_search_stores);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = stores.len(), "Listed file search stores");
        Ok(stores)
    }

    async fn create_store(&self, display_name: &str) -> AppResult<FileSearchStore> {
        let url = format!("{}/v1beta/fileSearchStores", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&CreateStoreRequest { display_name })
            .send()
            .await
            .map_err(Self::transport("Create store"))?;

        Self::check(response, "Create store")
            .await?
            .json()
            .await
            .map_err(Self::transport("Create store"))
    }

    async fn upload_file(&self, store_name: &str, path: &Path, mime_type: &str) -> AppResult<UploadOperation> {
        let data = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        // Resumable protocol: start a session, then send the bytes and finalize
        let start_url = format!("{}/upload/v1beta/{}:uploadToFileSearchStore", self.base_url, store_name);
        let response = self
            .client
            .post(&start_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadMetadata { display_name, mime_type })
            .send()
            .await
            .map_err(Self::transport("Start upload"))?;

        let response = Self::check(response, "Start upload").await?;
        let upload_url = response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::FileSearchApi("Start upload returned no upload URL".to_string()))?;

        debug!(bytes = data.len(), store = store_name, "Sending upload bytes");

        let response = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(data)
            .send()
            .await
            .map_err(Self::transport("Upload"))?;

        Self::check(response, "Upload")
            .await?
            .json()
            .await
            .map_err(Self::transport("Upload"))
    }

    async fn get_operation(&self, operation: &UploadOperation) -> AppResult<UploadOperation> {
        let url = format!("{}/v1beta/{}", self.base_url, operation.name);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(Self::transport("Get operation"))?;

        Self::check(response, "Get operation")
            .await?
            .json()
            .await
            .map_err(Self::transport("Get operation"))
    }
}
