//! Grounded document search
//!
//! Forwards a question to the model with the persisted File Search store
//! attached as a grounding tool, and returns the answer with the titles of
//! the documents it cited.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{string_arg, Tool, ToolContext, ToolError};
use crate::llm::LLMAdapter;
use crate::storage::ConfigStore;
use crate::types::{Content, FunctionDeclaration, LLMRequest, ToolSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchAnswer {
    pub answer: String,
    /// Cited document titles, deduplicated
    pub sources: Vec<String>,
    /// Grounding chunks cited, before deduplication
    pub citations: usize,
    pub indexed_files: Vec<String>,
}

pub struct DocumentSearcher {
    /// `None` when no API key is configured
    llm: Option<Arc<dyn LLMAdapter>>,
    config_store: Arc<dyn ConfigStore>,
    model: String,
}

impl DocumentSearcher {
    pub fn new(llm: Option<Arc<dyn LLMAdapter>>, config_store: Arc<dyn ConfigStore>, model: impl Into<String>) -> Self {
        Self {
            llm,
            config_store,
            model: model.into(),
        }
    }

    pub async fn search(&self, query: &str) -> Result<SearchAnswer, ToolError> {
        let config = self
            .config_store
            .load()
            .await?
            .ok_or(ToolError::StoreNotConfigured)?;
        let store_name = config
            .file_search_store_name
            .clone()
            .ok_or(ToolError::StoreNameMissing)?;
        let llm = self.llm.as_deref().ok_or(ToolError::MissingCredentials)?;

        info!(store = %store_name, query, "Searching in store");

        let mut request = LLMRequest::new(self.model.clone(), vec![Content::user_text(query)]);
        request.tools = vec![ToolSpec::FileSearch {
            store_names: vec![store_name],
        }];

        let response = llm.generate_content(&request).await?;

        let titles = response
            .grounding
            .as_ref()
            .map(|g| g.source_titles())
            .unwrap_or_default();
        let citations = titles.len();
        let mut sources: Vec<String> = Vec::new();
        for title in titles {
            if !sources.contains(&title) {
                sources.push(title);
            }
        }
        info!(citations, sources = sources.len(), "Search complete");

        Ok(SearchAnswer {
            answer: response.text(),
            sources,
            citations,
            indexed_files: config.uploaded_files,
        })
    }
}

pub struct SearchTool {
    searcher: Arc<DocumentSearcher>,
}

impl SearchTool {
    pub fn new(searcher: Arc<DocumentSearcher>) -> Self {
        Self { searcher }
    }
}

fn error_response(message: String, query: &str) -> Value {
    json!({
        "status": "error",
        "message": message,
        "answer": "",
        "sources": [],
        "query": query,
    })
}

#[async_trait]
impl Tool for SearchTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "search_documents".to_string(),
            description: "Answers a question using only the content of the indexed documents and lists the documents cited.".to_string(),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user's question, in natural language"
                    }
                },
                "required": ["query"]
            })),
        }
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Value {
        let query = match string_arg(&args, "query") {
            Ok(query) => query,
            Err(e) => return error_response(e.to_string(), ""),
        };

        match self.searcher.search(&query).await {
            Ok(answer) => {
                ctx.set_state(
                    "last_search",
                    json!({
                        "query": query,
                        "found_sources": answer.citations,
                        "indexed_files": answer.indexed_files,
                    }),
                );
                json!({
                    "status": "success",
                    "answer": answer.answer,
                    "sources": answer.sources,
                    "query": query,
                    "indexed_files": answer.indexed_files,
                })
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Search failed");
                error_response(e.message("Search failed"), &query)
            }
        }
    }
}
