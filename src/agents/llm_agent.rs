//! LLM Agent
//!
//! A model with an instruction and a set of tools. Each round sends the
//! conversation to the model; when the model asks for function calls, the
//! tools run and their responses are fed back, until the model answers
//! without calling anything.

use std::sync::Arc;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{Agent, EventStream, InvocationContext};
use crate::llm::LLMAdapter;
use crate::models::Event;
use crate::tools::{Tool, ToolContext};
use crate::types::{Content, FunctionCall, LLMRequest, Part, ToolSpec};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

pub struct LlmAgent {
    name: String,
    model: String,
    instruction: String,
    tools: Vec<Arc<dyn Tool>>,
    llm: Arc<dyn LLMAdapter>,
    max_tool_rounds: usize,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: impl Into<String>, llm: Arc<dyn LLMAdapter>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            instruction: String::new(),
            tools: Vec::new(),
            llm,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Conversation as the model sees it. Own events and user turns pass
    /// through; other agents' replies are reframed as context and their
    /// function calls dropped, since this model never declared those tools.
    fn build_contents<'a>(&self, events: impl Iterator<Item = &'a Event>) -> Vec<Content> {
        let mut contents = Vec::new();
        for event in events {
            let Some(content) = &event.content else { continue };
            if event.author == "user" || event.author == self.name {
                if !content.parts.is_empty() {
                    contents.push(content.clone());
                }
                continue;
            }

            let text = content.text();
            if !text.trim().is_empty() {
                contents.push(Content::user_text(format!(
                    "For context: [{}] said: {}",
                    event.author, text
                )));
            }
        }
        contents
    }

    fn build_request(&self, contents: Vec<Content>) -> LLMRequest {
        let mut request = LLMRequest::new(self.model.clone(), contents);
        if !self.instruction.is_empty() {
            request.system_instruction = Some(self.instruction.clone());
        }
        if !self.tools.is_empty() {
            request.tools = vec![ToolSpec::Functions(
                self.tools.iter().map(|t| t.declaration()).collect(),
            )];
        }
        request
    }

    async fn call_tools(&self, ctx: &InvocationContext, calls: Vec<FunctionCall>) -> Event {
        let mut tool_ctx = ToolContext::new(ctx);
        let mut parts = Vec::with_capacity(calls.len());

        for call in calls {
            info!(agent = %self.name, tool = %call.name, "Calling tool");
            let response = match self.find_tool(&call.name) {
                Some(tool) => tool.call(call.args.clone(), &mut tool_ctx).await,
                None => {
                    warn!(agent = %self.name, tool = %call.name, "Model called an unknown tool");
                    json!({
                        "status": "error",
                        "message": format!("Unknown tool '{}'", call.name),
                    })
                }
            };
            parts.push(Part::function_response(call.name, call.id, response));
        }

        Event::new(ctx.invocation_id.clone(), self.name.clone(), Content::user(parts))
            .with_state_delta(tool_ctx.state_delta)
    }

    async fn execute(&self, ctx: InvocationContext, tx: UnboundedSender<Event>) {
        let mut produced: Vec<Event> = Vec::new();
        let emit = |event: Event, produced: &mut Vec<Event>| -> bool {
            produced.push(event.clone());
            tx.unbounded_send(event).is_ok()
        };

        for round in 0..self.max_tool_rounds {
            let contents = self.build_contents(ctx.session.events.iter().chain(produced.iter()));
            let request = self.build_request(contents);
            debug!(agent = %self.name, round, contents = request.contents.len(), "Calling model");

            let response = match self.llm.generate_content(&request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(agent = %self.name, error = %e, "Model call failed");
                    emit(
                        Event::error(ctx.invocation_id.clone(), self.name.clone(), e.to_string()),
                        &mut produced,
                    );
                    return;
                }
            };

            debug!(
                agent = %self.name,
                round,
                finish_reason = %response.finish_reason,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                "Model responded"
            );

            let calls: Vec<FunctionCall> = response.content.function_calls().cloned().collect();
            let model_event = Event::new(ctx.invocation_id.clone(), self.name.clone(), response.content);
            if !emit(model_event, &mut produced) {
                warn!(agent = %self.name, "Event receiver dropped, stopping");
                return;
            }

            if calls.is_empty() {
                debug!(agent = %self.name, round, "Final response");
                return;
            }

            let tool_event = self.call_tools(&ctx, calls).await;
            if !emit(tool_event, &mut produced) {
                warn!(agent = %self.name, "Event receiver dropped, stopping");
                return;
            }
        }

        warn!(agent = %self.name, rounds = self.max_tool_rounds, "Tool round limit reached");
        emit(
            Event::error(
                ctx.invocation_id.clone(),
                self.name.clone(),
                format!("Stopped after {} tool rounds without a final answer", self.max_tool_rounds),
            ),
            &mut produced,
        );
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        let (tx, rx) = unbounded();
        tokio::spawn(async move {
            self.execute(ctx, tx).await;
        });
        rx.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::tools::ToolError;
    use crate::types::{AppError, AppResult, FunctionDeclaration, LLMResponse, TokenUsage};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Model that replays scripted responses and records every request
    struct ScriptedModel {
        responses: Mutex<VecDeque<AppResult<Content>>>,
        requests: Mutex<Vec<LLMRequest>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<AppResult<Content>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMAdapter for ScriptedModel {
        async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Content::model(vec![Part::text("done")])));
            next.map(|content| LLMResponse {
                content,
                finish_reason: "STOP".to_string(),
                grounding: None,
                usage: TokenUsage::default(),
            })
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn declaration(&self) -> FunctionDeclaration {
            FunctionDeclaration {
                name: "echo".to_string(),
                description: "Echoes its input".to_string(),
                parameters: None,
            }
        }

        async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Value {
            ctx.set_state("echoed", args.clone());
            match args.get("text") {
                Some(text) => json!({"status": "success", "echo": text}),
                None => json!({"status": "error", "message": ToolError::MissingArgument("text").to_string()}),
            }
        }
    }

    fn call(name: &str, args: Value) -> Content {
        Content::model(vec![Part {
            function_call: Some(FunctionCall {
                id: Some("call-1".to_string()),
                name: name.to_string(),
                args,
            }),
            ..Default::default()
        }])
    }

    fn context(text: &str) -> InvocationContext {
        let mut session = Session::new();
        session.append_event(Event::user("inv", Content::user_text(text)));
        InvocationContext::new("inv", session)
    }

    #[tokio::test]
    async fn test_tool_loop_emits_call_response_and_answer() {
        let model = ScriptedModel::new(vec![
            Ok(call("echo", json!({"text": "hi"}))),
            Ok(Content::model(vec![Part::text("You said hi")])),
        ]);
        let agent = Arc::new(
            LlmAgent::new("Echoer", "m", model.clone())
                .with_instruction("Echo things")
                .with_tool(Arc::new(EchoTool)),
        );

        let events: Vec<Event> = agent.run(context("say hi")).collect().await;

        assert_eq!(events.len(), 3);
        assert!(events[0].content.as_ref().unwrap().function_calls().next().is_some());
        let response = events[1].content.as_ref().unwrap().parts[0].function_response.clone().unwrap();
        assert_eq!(response.name, "echo");
        assert_eq!(response.id.as_deref(), Some("call-1"));
        assert_eq!(response.response["echo"], "hi");
        assert_eq!(events[1].actions.state_delta["echoed"], json!({"text": "hi"}));
        assert!(events[2].is_final_response());
        assert!(events.iter().all(|e| e.author == "Echoer" && e.invocation_id == "inv"));

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].system_instruction.as_deref(), Some("Echo things"));
        // Second round carries the user turn, the call and the tool response
        assert_eq!(requests[1].contents.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_gets_error_response() {
        let model = ScriptedModel::new(vec![Ok(call("missing", json!({})))]);
        let agent = Arc::new(LlmAgent::new("A", "m", model).with_tool(Arc::new(EchoTool)));

        let events: Vec<Event> = agent.run(context("x")).collect().await;
        let response = events[1].content.as_ref().unwrap().parts[0].function_response.clone().unwrap();
        assert_eq!(response.response["status"], "error");
        assert_eq!(response.response["message"], "Unknown tool 'missing'");
    }

    #[tokio::test]
    async fn test_model_error_becomes_error_event() {
        let model = ScriptedModel::new(vec![Err(AppError::LLMApi("boom".to_string()))]);
        let agent = Arc::new(LlmAgent::new("A", "m", model));

        let events: Vec<Event> = agent.run(context("x")).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error_message.as_deref(), Some("LLM API error: boom"));
    }

    #[tokio::test]
    async fn test_round_limit_stops_the_loop() {
        let model = ScriptedModel::new(vec![
            Ok(call("echo", json!({"text": "1"}))),
            Ok(call("echo", json!({"text": "2"}))),
            Ok(call("echo", json!({"text": "3"}))),
        ]);
        let agent = Arc::new(
            LlmAgent::new("A", "m", model)
                .with_tool(Arc::new(EchoTool))
                .with_max_tool_rounds(2),
        );

        let events: Vec<Event> = agent.run(context("x")).collect().await;
        // Two rounds of call + response, then the limit error
        assert_eq!(events.len(), 5);
        assert!(events[4].error_message.as_deref().unwrap().contains("2 tool rounds"));
    }

    #[test]
    fn test_other_agents_are_reframed_as_context() {
        let model = ScriptedModel::new(vec![]);
        let agent = LlmAgent::new("SearchAgent", "m", model);

        let events = vec![
            Event::user("i1", Content::user_text("upload this")),
            Event::new("i1", "FileManager", call("index_uploaded_file", json!({"filename": "a"}))),
            Event::new("i1", "FileManager", Content::model(vec![Part::text("Indexed a.pdf")])),
            Event::error("i1", "FileManager", "boom"),
            Event::user("i2", Content::user_text("what is in it?")),
        ];

        let contents = agent.build_contents(events.iter());
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].text(), "For context: [FileManager] said: Indexed a.pdf");
        assert_eq!(contents[1].role.as_deref(), Some("user"));
    }
}
