//! Agent tools
//!
//! Tools are the functions an LLM agent may call. Each tool runs a typed
//! operation (`Result<_, ToolError>`) and only turns the outcome into a JSON
//! map at the edge, where the model reads it as a function response.

pub mod file_upload;
pub mod search;

pub use file_upload::{FileIndexer, FileListing, IndexFileTool, IndexOutcome, IndexSettings, ListFilesTool};
pub use search::{DocumentSearcher, SearchAnswer, SearchTool};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agents::InvocationContext;
use crate::types::{AppError, FunctionDeclaration};

/// Failures a tool reports back to the model as structured data
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Neither FILE_SEARCH_API_KEY nor GOOGLE_API_KEY found in environment")]
    MissingCredentials,

    #[error("No file store configured. Index a file before searching.")]
    StoreNotConfigured,

    #[error("File store name not found in configuration")]
    StoreNameMissing,

    #[error("File '{filename}' not found in storage or session history. Available artifacts: {available:?}")]
    FileNotFound { filename: String, available: Vec<String> },

    #[error("Upload timed out after {secs}s")]
    UploadTimedOut { secs: u64 },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Backend(#[from] AppError),
}

impl ToolError {
    /// Message for the model; backend failures get the operation prefix
    pub fn message(&self, failure_prefix: &str) -> String {
        match self {
            ToolError::Backend(e) => format!("{}: {}", failure_prefix, e),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Backend(AppError::Io(e))
    }
}

/// What a tool sees while it runs: the invocation it belongs to, plus the
/// state changes it wants recorded on the session.
pub struct ToolContext<'a> {
    pub invocation: &'a InvocationContext,
    pub state_delta: Map<String, Value>,
}

impl<'a> ToolContext<'a> {
    pub fn new(invocation: &'a InvocationContext) -> Self {
        Self {
            invocation,
            state_delta: Map::new(),
        }
    }

    pub fn set_state(&mut self, key: &str, value: Value) {
        self.state_delta.insert(key.to_string(), value);
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> FunctionDeclaration;

    /// Run the tool. Failures are returned inside the JSON map, never raised.
    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Value;

    fn name(&self) -> String {
        self.declaration().name
    }
}

/// Fetch a required string argument from a function call
pub(crate) fn string_arg(args: &Value, key: &'static str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ToolError::MissingArgument(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ToolError::UploadTimedOut { secs: 120 }.to_string(),
            "Upload timed out after 120s"
        );
        assert!(ToolError::StoreNotConfigured
            .to_string()
            .starts_with("No file store configured"));

        let backend = ToolError::Backend(AppError::FileSearchApi("quota".to_string()));
        assert_eq!(backend.message("Search failed"), "Search failed: File search API error: quota");
        assert_eq!(ToolError::StoreNameMissing.message("Search failed"), "File store name not found in configuration");
    }

    #[test]
    fn test_string_arg() {
        let args = json!({"filename": "report.pdf", "empty": "  "});
        assert_eq!(string_arg(&args, "filename").unwrap(), "report.pdf");
        assert!(matches!(string_arg(&args, "empty"), Err(ToolError::MissingArgument("empty"))));
        assert!(string_arg(&json!({}), "query").is_err());
    }
}
