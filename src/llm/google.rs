// Google Gemini adapter
// API Reference: https://ai.google.dev/api/generate-content
//
// Uses the REST surface directly: one `generateContent` call per model turn,
// with function declarations and File Search grounding passed as tools.

use crate::llm::provider::LLMAdapter;
use crate::types::{
    AppError, AppResult, Content, FunctionDeclaration, GroundingMetadata, LLMRequest, LLMResponse, Part,
    TokenUsage, ToolSpec,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

// Request types for the Gemini API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    #[serde(skip_serializing_if = "Option::is_none")]
    function_declarations: Option<Vec<FunctionDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_search: Option<FileSearchTool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSearchTool {
    file_search_store_names: Vec<String>,
}

// Response types for the Gemini API
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct GoogleErrorResponse {
    pub error: GoogleError,
}

#[derive(Deserialize)]
pub(crate) struct GoogleError {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Render a non-success response body as a readable error message
pub(crate) fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(parsed) => format!(
            "{} ({})",
            parsed.error.message,
            parsed.error.status.unwrap_or_else(|| status.to_string())
        ),
        Err(_) => format!("{}: {}", status, body),
    }
}

impl GoogleAdapter {
    /// Point the adapter at a different API host (proxies, tests)
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<GeminiTool> {
        tools
            .iter()
            .map(|tool| match tool {
                ToolSpec::Functions(declarations) => GeminiTool {
                    function_declarations: Some(declarations.clone()),
                    file_search: None,
                },
                ToolSpec::FileSearch { store_names } => GeminiTool {
                    function_declarations: None,
                    file_search: Some(FileSearchTool {
                        file_search_store_names: store_names.clone(),
                    }),
                },
            })
            .collect()
    }
}

#[async_trait]
impl LLMAdapter for GoogleAdapter {
    async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, request.model);

        let body = GenerateContentRequest {
            contents: &request.contents,
            system_instruction: request
                .system_instruction
                .as_ref()
                .map(|text| Content { role: None, parts: vec![Part::text(text.clone())] }),
            tools: Self::convert_tools(&request.tools),
        };

        debug!(model = %request.model, contents = request.contents.len(), "Calling generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMApi(format!(
                "Gemini API error: {}",
                describe_error(status, &error_text)
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        let candidate = match parsed.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => {
                let reason = parsed
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates".to_string());
                return Err(AppError::LLMApi(format!("Gemini returned no candidates: {}", reason)));
            }
        };

        let mut content = candidate.content.unwrap_or_default();
        if content.role.is_none() {
            content.role = Some("model".to_string());
        }

        Ok(LLMResponse {
            content,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "STOP".to_string()),
            grounding: candidate.grounding_metadata,
            usage,
        })
    }
}
