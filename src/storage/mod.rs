//! Store bookkeeping
//!
//! Keeps track of which hosted File Search store backs this deployment and
//! which content-derived filenames were already indexed into it. The record
//! lives in a flat JSON sidecar that is rewritten whole after every change;
//! concurrent writers race and the last write wins.

pub mod file_search;
pub mod fingerprint;

pub use file_search::*;
pub use fingerprint::content_filename;

use crate::types::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Persisted store record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Resource name of the hosted store, e.g. `fileSearchStores/abc123`
    #[serde(default)]
    pub file_search_store_name: Option<String>,
    /// Content-derived filenames already indexed into the store
    #[serde(default)]
    pub uploaded_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl StoreConfig {
    pub fn is_indexed(&self, filename: &str) -> bool {
        self.uploaded_files.iter().any(|f| f == filename)
    }
}

/// Read/write access to the persisted store record
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// `None` when nothing was ever persisted
    async fn load(&self) -> AppResult<Option<StoreConfig>>;

    async fn save(&self, config: &StoreConfig) -> AppResult<()>;

    async fn load_or_default(&self) -> AppResult<StoreConfig> {
        Ok(self.load().await?.unwrap_or_default())
    }
}

/// `ConfigStore` backed by a single pretty-printed JSON file
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load(&self) -> AppResult<Option<StoreConfig>> {
        if !fs::try_exists(&self.path).await? {
            debug!(path = ?self.path, "No store config on disk");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        Ok(Some(config))
    }

    async fn save(&self, config: &StoreConfig) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content).await?;

        info!(
            path = ?self.path,
            indexed = config.uploaded_files.len(),
            "Saved store config"
        );
        Ok(())
    }
}
