//! Turn routing
//!
//! The orchestrator looks at the latest user turn, picks a collaborator and
//! relays that collaborator's events unchanged and in order.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::{Agent, EventStream, InvocationContext};
use crate::config::RouterConfig;
use crate::storage::content_filename;
use crate::types::Content;

/// Collaborator a turn is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    FileManager,
    Search,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::FileManager => write!(f, "file-manager"),
            Destination::Search => write!(f, "search"),
        }
    }
}

pub trait TurnClassifier: Send + Sync {
    /// Decide where a turn goes. `None` means the session has no events yet.
    fn classify(&self, turn: Option<&Content>) -> Destination;
}

/// Routes uploads and file-related requests to the file manager, the rest
/// to search.
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(&config.keywords)
    }

    /// First configured keyword found in the lower-cased text
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| text.contains(k.as_str()))
            .map(String::as_str)
    }
}

impl TurnClassifier for KeywordClassifier {
    fn classify(&self, turn: Option<&Content>) -> Destination {
        let Some(turn) = turn else {
            return Destination::Search;
        };

        if turn.has_inline_data() {
            debug!("Turn carries an upload");
            return Destination::FileManager;
        }

        match self.matched_keyword(&turn.text()) {
            Some(keyword) => {
                debug!(keyword, "Turn matched a file keyword");
                Destination::FileManager
            }
            None => Destination::Search,
        }
    }
}

/// Events of one routed turn
pub struct RoutedTurn {
    pub destination: Destination,
    pub events: EventStream,
}

pub struct Orchestrator {
    name: String,
    classifier: Box<dyn TurnClassifier>,
    file_manager: Arc<dyn Agent>,
    search_assistant: Arc<dyn Agent>,
}

impl Orchestrator {
    pub fn new(
        name: impl Into<String>,
        classifier: Box<dyn TurnClassifier>,
        file_manager: Arc<dyn Agent>,
        search_assistant: Arc<dyn Agent>,
    ) -> Self {
        Self {
            name: name.into(),
            classifier,
            file_manager,
            search_assistant,
        }
    }

    pub fn route(&self, ctx: &InvocationContext) -> Destination {
        let turn = ctx.latest_turn();
        if let Some(turn) = turn {
            for blob in turn.inline_blobs() {
                info!(
                    orchestrator = %self.name,
                    mime_type = %blob.mime_type,
                    filename = %content_filename(&blob.data, &blob.mime_type),
                    "Upload will be indexed as"
                );
            }
        }

        let destination = self.classifier.classify(turn);
        info!(orchestrator = %self.name, %destination, "Routing turn");
        destination
    }

    /// Route the turn and relay the chosen collaborator's events
    pub fn dispatch(&self, ctx: InvocationContext) -> RoutedTurn {
        let destination = self.route(&ctx);
        let agent = match destination {
            Destination::FileManager => self.file_manager.clone(),
            Destination::Search => self.search_assistant.clone(),
        };

        let name = self.name.clone();
        let events = agent
            .run(ctx)
            .inspect(move |event| {
                debug!(orchestrator = %name, author = %event.author, "Relaying event");
            })
            .boxed();

        RoutedTurn { destination, events }
    }
}

impl Agent for Orchestrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        self.dispatch(ctx).events
    }
}
