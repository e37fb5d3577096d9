//! Turn execution
//!
//! Records the user's turn on the session, hands a snapshot to the
//! orchestrator and appends every event it yields back onto the session as
//! it streams past.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{EventStream, InvocationContext};
use crate::models::Event;
use crate::orchestrator::{Destination, Orchestrator};
use crate::session::SessionService;
use crate::types::{AppResult, Content};

pub struct TurnStream {
    pub session_id: Uuid,
    pub destination: Destination,
    pub events: EventStream,
}

pub struct Runner {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionService>,
}

impl Runner {
    pub fn new(orchestrator: Arc<Orchestrator>, sessions: Arc<SessionService>) -> Self {
        Self { orchestrator, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    /// Run one user turn. Events are persisted as the returned stream is
    /// polled, so callers must drain it.
    pub async fn run_turn(&self, session_id: Uuid, message: Content) -> AppResult<TurnStream> {
        let invocation_id = format!("e-{}", Uuid::new_v4());
        self.sessions
            .append_event(session_id, Event::user(invocation_id.clone(), message))
            .await?;

        let session = self.sessions.get_session(session_id).await?;
        info!(%session_id, %invocation_id, events = session.events.len(), "Running turn");

        let routed = self.orchestrator.dispatch(InvocationContext::new(invocation_id, session));

        let sessions = self.sessions.clone();
        let events = routed
            .events
            .then(move |event| {
                let sessions = sessions.clone();
                async move {
                    if let Err(e) = sessions.append_event(session_id, event.clone()).await {
                        warn!(%session_id, error = %e, "Failed to record event");
                    }
                    event
                }
            })
            .boxed();

        Ok(TurnStream {
            session_id,
            destination: routed.destination,
            events,
        })
    }

    /// Run a turn and wait for all of its events
    pub async fn run_turn_collect(&self, session_id: Uuid, message: Content) -> AppResult<(Destination, Vec<Event>)> {
        let turn = self.run_turn(session_id, message).await?;
        let events = turn.events.collect().await;
        Ok((turn.destination, events))
    }
}
