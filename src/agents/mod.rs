//! Agent System
//!
//! The collaborators the router delegates a turn to:
//!
//! - **File Manager**: lists uploaded files and indexes the ones not yet in
//!   the search store
//! - **Search Assistant**: answers questions grounded in the indexed documents
//!
//! ## Turn Overview
//!
//! ```text
//! User Turn
//!      │
//!      ▼
//! ┌──────────────┐
//! │ Orchestrator │  → Picks a collaborator (upload or keyword → file manager)
//! └──────────────┘
//!      │
//!      ├──────────────────────┐
//!      ▼                      ▼
//! ┌──────────────┐     ┌──────────────┐
//! │ File Manager │     │    Search    │  → Model + tool calls
//! └──────────────┘     └──────────────┘
//!      │                      │
//!      └──────────┬───────────┘
//!                 ▼
//!          Event stream relayed to the caller
//! ```

pub mod llm_agent;
pub mod file_manager;
pub mod search;

pub use llm_agent::LlmAgent;

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::config::Config;
use crate::llm::{GoogleAdapter, LLMAdapter};
use crate::models::Event;
use crate::orchestrator::{KeywordClassifier, Orchestrator};
use crate::session::Session;
use crate::storage::{ConfigStore, FileSearchBackend, GoogleFileSearch};
use crate::tools::{DocumentSearcher, FileIndexer, IndexSettings};
use crate::types::Content;

/// Ordered events produced by an agent for one invocation
pub type EventStream = BoxStream<'static, Event>;

/// Everything an agent needs to handle one turn: a snapshot of the session
/// (the triggering user event is its last event) and the invocation id shared
/// by every event it emits.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub session: Session,
}

impl InvocationContext {
    pub fn new(invocation_id: impl Into<String>, session: Session) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            session,
        }
    }

    /// Content of the most recent session event, normally the user's turn
    pub fn latest_turn(&self) -> Option<&Content> {
        self.session.events.last().and_then(|e| e.content.as_ref())
    }
}

pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream;
}

/// External services the collaborators talk to
pub struct AgentDeps {
    pub llm: Arc<dyn LLMAdapter>,
    /// `None` when no API key is configured; tools then report the missing key
    pub tool_llm: Option<Arc<dyn LLMAdapter>>,
    pub file_search: Option<Arc<dyn FileSearchBackend>>,
    pub config_store: Arc<dyn ConfigStore>,
}

impl AgentDeps {
    /// Gemini-backed services for the given configuration
    pub fn google(config: &Config, config_store: Arc<dyn ConfigStore>) -> Self {
        let api_key = config.llm.active_api_key();
        if api_key.is_none() {
            tracing::warn!("No Gemini API key configured; model calls and tools will fail");
        }
        let key = api_key.clone().unwrap_or_default();

        let llm: Arc<dyn LLMAdapter> = Arc::new(GoogleAdapter::with_base_url(&key, &config.llm.base_url));
        let file_search = api_key.map(|key| {
            Arc::new(GoogleFileSearch::with_base_url(&key, &config.llm.base_url)) as Arc<dyn FileSearchBackend>
        });

        Self {
            tool_llm: file_search.as_ref().map(|_| llm.clone()),
            llm,
            file_search,
            config_store,
        }
    }
}

/// Wire the two collaborators behind a keyword-routing orchestrator
pub fn build_orchestrator(config: &Config, deps: AgentDeps) -> Orchestrator {
    let indexer = Arc::new(FileIndexer::new(
        deps.file_search,
        deps.config_store.clone(),
        IndexSettings::from_config(&config.store),
    ));
    let searcher = Arc::new(DocumentSearcher::new(
        deps.tool_llm,
        deps.config_store,
        config.llm.search_model.clone(),
    ));

    let file_manager = file_manager::build(deps.llm.clone(), &config.llm.agent_model, indexer)
        .with_max_tool_rounds(config.llm.max_tool_rounds);
    let search_assistant = search::build(deps.llm, &config.llm.agent_model, searcher)
        .with_max_tool_rounds(config.llm.max_tool_rounds);

    Orchestrator::new(
        "RAGOrchestrator",
        Box::new(KeywordClassifier::from_config(&config.router)),
        Arc::new(file_manager),
        Arc::new(search_assistant),
    )
}
