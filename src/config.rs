use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_STORE_DISPLAY_NAME: &str = "rag-router-store";
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "upload",
    "index",
    "arquivo",
    "liste os arquivos",
    "quais arquivos",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub store: FileStoreConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    /// `FILE_SEARCH_API_KEY`, falling back to `GOOGLE_API_KEY`
    pub google_api_key: Option<String>,
    pub base_url: String,
    pub agent_model: String,
    pub search_model: String,
    pub max_tool_rounds: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileStoreConfig {
    /// Display name used to find or create the hosted store
    pub display_name: String,
    /// JSON sidecar holding the store name and the indexed filenames
    pub config_path: PathBuf,
    /// Scratch directory uploads are written to before being sent
    pub upload_dir: PathBuf,
    pub upload_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl LLMConfig {
    pub fn active_api_key(&self) -> Option<String> {
        self.google_api_key.clone().filter(|k| !k.is_empty())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: split_list(
                    &env::var("ALLOWED_ORIGINS")
                        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string()),
                ),
            },
            llm: LLMConfig {
                google_api_key: non_empty_var("FILE_SEARCH_API_KEY")
                    .or_else(|| non_empty_var("GOOGLE_API_KEY")),
                base_url: env::var("GOOGLE_API_BASE_URL")
                    .unwrap_or_else(|_| crate::llm::google::GOOGLE_API_BASE.to_string()),
                agent_model: env::var("DEMO_AGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
                search_model: env::var("SEARCH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
                max_tool_rounds: env::var("MAX_TOOL_ROUNDS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()?,
            },
            store: FileStoreConfig {
                display_name: non_empty_var("STORE_NAME")
                    .unwrap_or_else(|| DEFAULT_STORE_DISPLAY_NAME.to_string()),
                config_path: env::var("FILE_STORE_CONFIG")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("file_store_config.json")),
                upload_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| env::temp_dir().join("rag_uploads")),
                upload_timeout: Duration::from_secs(
                    env::var("UPLOAD_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "120".to_string())
                        .parse()?,
                ),
                poll_interval: Duration::from_secs(
                    env::var("UPLOAD_POLL_INTERVAL_SECS")
                        .unwrap_or_else(|_| "3".to_string())
                        .parse()?,
                ),
            },
            router: match non_empty_var("ROUTER_KEYWORDS") {
                Some(raw) => RouterConfig {
                    keywords: split_list(&raw.to_lowercase()),
                },
                None => RouterConfig::default(),
            },
        })
    }
}
