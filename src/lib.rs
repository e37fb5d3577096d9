// RAG Router - routes conversation turns between a file-indexing agent and a
// grounded search agent backed by Gemini File Search

pub mod agents;
pub mod config;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod runner;
pub mod session;
pub mod storage;
pub mod tools;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

use std::sync::Arc;

use agents::{build_orchestrator, AgentDeps};
use runner::Runner;
use session::SessionService;
use storage::{ConfigStore, JsonConfigStore};

/// Shared state wired to Gemini and the JSON store config
pub fn build_state(config: Config) -> AppState {
    let config_store: Arc<dyn ConfigStore> = Arc::new(JsonConfigStore::new(config.store.config_path.clone()));
    let deps = AgentDeps::google(&config, config_store);
    build_state_with(config, deps)
}

/// Shared state over the given services
pub fn build_state_with(config: Config, deps: AgentDeps) -> AppState {
    let config_store = deps.config_store.clone();
    let orchestrator = Arc::new(build_orchestrator(&config, deps));
    let sessions = Arc::new(SessionService::new());
    let runner = Arc::new(Runner::new(orchestrator, sessions.clone()));

    AppState {
        config,
        sessions,
        runner,
        config_store,
    }
}

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
