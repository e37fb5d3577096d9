use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::orchestrator::Destination;
use crate::runner::Runner;
use crate::session::SessionService;
use crate::storage::ConfigStore;
use crate::types::Content;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionService>,
    pub runner: Arc<Runner>,
    pub config_store: Arc<dyn ConfigStore>,
}

/// Side effects an event asks the session to apply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state_delta: Map<String, Value>,
}

/// One entry of a conversation: a user turn, a model response, or the
/// results of the tools a model called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub invocation_id: String,
    /// `user` or the name of the agent that produced the event
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>, content: Content) -> Self {
        Self {
            id: Uuid::new_v4(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: Some(content),
            actions: EventActions::default(),
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(invocation_id: impl Into<String>, content: Content) -> Self {
        Self::new(invocation_id, "user", content)
    }

    pub fn error(invocation_id: impl Into<String>, author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            actions: EventActions::default(),
            error_message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_state_delta(mut self, delta: Map<String, Value>) -> Self {
        self.actions.state_delta = delta;
        self
    }

    /// True when the event carries neither function calls nor function responses
    pub fn is_final_response(&self) -> bool {
        match &self.content {
            Some(content) => content
                .parts
                .iter()
                .all(|p| p.function_call.is_none() && p.function_response.is_none()),
            None => true,
        }
    }
}

/// Attachment sent inline with a chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
    /// Optional user-facing name; stored as a session artifact when given
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub destination: Destination,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_count: usize,
    pub state: Map<String, Value>,
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub name: String,
    pub mime_type: String,
    pub size: usize,
    /// Name the file will be indexed under
    pub content_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub files: Vec<StoredArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub store_configured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionCall, Part};

    #[test]
    fn test_is_final_response() {
        let text = Event::new("inv", "SearchAgent", Content::model(vec![Part::text("done")]));
        assert!(text.is_final_response());

        let call = Event::new(
            "inv",
            "SearchAgent",
            Content::model(vec![Part {
                function_call: Some(FunctionCall {
                    id: None,
                    name: "search_documents".to_string(),
                    args: serde_json::json!({"query": "q"}),
                }),
                ..Default::default()
            }]),
        );
        assert!(!call.is_final_response());
        assert!(Event::error("inv", "SearchAgent", "boom").is_final_response());
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = Event::user("inv", Content::user_text("oi"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["author"], "user");
        assert!(json.get("error_message").is_none());
        assert!(json["actions"].get("state_delta").is_none());
    }

    #[test]
    fn test_chat_request_defaults() {
        let request: ChatRequest = serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert!(request.session_id.is_none());
        assert!(request.attachments.is_empty());
    }
}
