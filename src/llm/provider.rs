use async_trait::async_trait;
use crate::types::{LLMRequest, LLMResponse, AppResult};

/// A hosted model that can generate content, call declared functions and
/// ground answers in File Search stores.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}
