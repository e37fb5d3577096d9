//! In-memory sessions
//!
//! A session holds the ordered event history of one conversation, a JSON
//! state map updated through event state deltas, and named artifacts
//! (files uploaded outside a chat turn).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Event, SessionSummary};
use crate::types::{AppError, AppResult, Blob};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    pub artifacts: BTreeMap<String, Blob>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Map::new(),
            events: Vec::new(),
            artifacts: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Append an event and merge its state delta into the session state
    pub fn append_event(&mut self, event: Event) {
        for (key, value) in &event.actions.state_delta {
            self.state.insert(key.clone(), value.clone());
        }
        self.events.push(event);
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            created_at: self.created_at,
            event_count: self.events.len(),
            state: self.state.clone(),
            artifacts: self.artifact_names(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct SessionService {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self) -> Session {
        let session = Session::new();
        self.sessions.write().await.insert(session.id, session.clone());
        info!(session_id = %session.id, "Created session");
        session
    }

    /// Snapshot of a session
    pub async fn get_session(&self, id: Uuid) -> AppResult<Session> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
    }

    /// Return the session for `id`, or a new one when `id` is `None`
    pub async fn get_or_create(&self, id: Option<Uuid>) -> AppResult<Session> {
        match id {
            Some(id) => self.get_session(id).await,
            None => Ok(self.create_session().await),
        }
    }

    pub async fn append_event(&self, id: Uuid, event: Event) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
        debug!(session_id = %id, author = %event.author, "Appending event");
        session.append_event(event);
        Ok(())
    }

    pub async fn save_artifact(&self, id: Uuid, name: &str, blob: Blob) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
        info!(session_id = %id, name, bytes = blob.data.len(), "Saved artifact");
        session.artifacts.insert(name.to_string(), blob);
        Ok(())
    }
}
