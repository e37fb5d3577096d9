// End-to-end turns through the HTTP app with a rule-driven model and an
// in-memory file search backend

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use rag_router::agents::AgentDeps;
use rag_router::config::{Config, FileStoreConfig, LLMConfig, RouterConfig, ServerConfig};
use rag_router::llm::LLMAdapter;
use rag_router::storage::{
    content_filename, ConfigStore, FileSearchBackend, FileSearchStore, JsonConfigStore, UploadOperation,
};
use rag_router::types::{
    AppResult, Content, FunctionCall, GroundingChunk, GroundingMetadata, LLMRequest, LLMResponse, Part,
    RetrievedContext, TokenUsage, ToolSpec,
};
use rag_router::{build_state_with, create_router};

const PDF_BYTES: &[u8] = b"%PDF-1.4 quarterly report";

/// Plays both agents: calls the tools the agent declares in the order the
/// instructions ask for, then answers in text.
struct RuleModel;

fn call(name: &str, args: Value) -> Content {
    Content::model(vec![Part {
        function_call: Some(FunctionCall {
            id: None,
            name: name.to_string(),
            args,
        }),
        ..Default::default()
    }])
}

fn reply(content: Content) -> LLMResponse {
    LLMResponse {
        content,
        finish_reason: "STOP".to_string(),
        grounding: None,
        usage: TokenUsage::default(),
    }
}

#[async_trait]
impl LLMAdapter for RuleModel {
    async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let tool_names: Vec<String> = request
            .tools
            .iter()
            .flat_map(|tool| match tool {
                ToolSpec::Functions(decls) => decls.iter().map(|d| d.name.clone()).collect(),
                ToolSpec::FileSearch { .. } => vec!["file_search".to_string()],
            })
            .collect();

        if tool_names == ["file_search"] {
            let mut response = reply(Content::model(vec![Part::text("Revenue grew 15%.")]));
            response.grounding = Some(GroundingMetadata {
                grounding_chunks: vec![GroundingChunk {
                    retrieved_context: Some(RetrievedContext {
                        title: Some("doc_report.pdf".to_string()),
                        ..Default::default()
                    }),
                }],
            });
            return Ok(response);
        }

        let last = request.contents.last().cloned().unwrap_or_default();
        let last_response = last.parts.iter().find_map(|p| p.function_response.clone());

        let content = match (last_response, tool_names.contains(&"list_uploaded_files".to_string())) {
            (None, true) => call("list_uploaded_files", json!({})),
            (Some(r), true) if r.name == "list_uploaded_files" => match r.response["not_indexed"].get(0) {
                Some(name) => call("index_uploaded_file", json!({ "filename": name })),
                None => Content::model(vec![Part::text("Everything is already indexed.")]),
            },
            (Some(r), true) => Content::model(vec![Part::text(format!("Done: {}", r.response["message"]))]),
            (None, false) => call("search_documents", json!({ "query": last.text() })),
            (Some(r), false) => Content::model(vec![Part::text(format!(
                "{} (sources: {})",
                r.response["answer"].as_str().unwrap_or_default(),
                r.response["sources"]
            ))]),
        };
        Ok(reply(content))
    }
}

#[derive(Default)]
struct MemoryBackend {
    uploads: AtomicUsize,
}

#[async_trait]
impl FileSearchBackend for MemoryBackend {
    async fn list_stores(&self) -> AppResult<Vec<FileSearchStore>> {
        Ok(vec![])
    }

    async fn create_store(&self, display_name: &str) -> AppResult<FileSearchStore> {
        Ok(FileSearchStore {
            name: "fileSearchStores/test".to_string(),
            display_name: Some(display_name.to_string()),
            active_documents_count: None,
        })
    }

    async fn upload_file(&self, _store_name: &str, path: &Path, _mime_type: &str) -> AppResult<UploadOperation> {
        assert!(path.exists());
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(UploadOperation {
            name: "operations/1".to_string(),
            done: true,
            error: None,
        })
    }

    async fn get_operation(&self, operation: &UploadOperation) -> AppResult<UploadOperation> {
        Ok(operation.clone())
    }
}

struct Harness {
    app: Router,
    backend: Arc<MemoryBackend>,
    config_store: Arc<JsonConfigStore>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        },
        llm: LLMConfig {
            google_api_key: Some("test-key".to_string()),
            base_url: "http://localhost".to_string(),
            agent_model: "agent-model".to_string(),
            search_model: "search-model".to_string(),
            max_tool_rounds: 8,
        },
        store: FileStoreConfig {
            display_name: "rag-router-store".to_string(),
            config_path: dir.path().join("file_store_config.json"),
            upload_dir: dir.path().join("uploads"),
            upload_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        },
        router: RouterConfig::default(),
    };

    let backend = Arc::new(MemoryBackend::default());
    let config_store = Arc::new(JsonConfigStore::new(config.store.config_path.clone()));
    let llm: Arc<dyn LLMAdapter> = Arc::new(RuleModel);
    let deps = AgentDeps {
        llm: llm.clone(),
        tool_llm: Some(llm),
        file_search: Some(backend.clone() as Arc<dyn FileSearchBackend>),
        config_store: config_store.clone(),
    };

    Harness {
        app: create_router(build_state_with(config, deps)),
        backend,
        config_store,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, bytes) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn final_text(events: &Value) -> String {
    let last = events.as_array().unwrap().last().unwrap();
    last["content"]["parts"][0]["text"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health_reports_missing_store() {
    let h = harness();
    let (status, body) = get_json(&h.app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store_configured"], false);
}

#[tokio::test]
async fn test_upload_then_question() {
    let h = harness();
    let expected = content_filename(PDF_BYTES, "application/pdf");

    let (status, body) = post_json(
        &h.app,
        "/api/chat",
        json!({
            "message": "what does this say?",
            "attachments": [{"mime_type": "application/pdf", "data": STANDARD.encode(PDF_BYTES)}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "file-manager");
    assert!(body["events"].as_array().unwrap().iter().all(|e| e["author"] == "FileManager"));
    assert!(final_text(&body["events"]).contains(&expected));
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);

    let saved = h.config_store.load().await.unwrap().unwrap();
    assert_eq!(saved.file_search_store_name.as_deref(), Some("fileSearchStores/test"));
    assert_eq!(saved.uploaded_files, vec![expected.clone()]);

    let session_id = body["session_id"].as_str().unwrap().to_string();
    let (status, body) = post_json(
        &h.app,
        "/api/chat",
        json!({"session_id": session_id, "message": "Como a receita mudou?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "search");
    let answer = final_text(&body["events"]);
    assert!(answer.contains("Revenue grew 15%."));
    assert!(answer.contains("doc_report.pdf"));

    let (_, session) = get_json(&h.app, &format!("/api/sessions/{}", session_id)).await;
    assert_eq!(session["state"]["last_indexed_file"], expected.as_str());
    assert_eq!(session["state"]["last_search"]["found_sources"], 1);

    let (_, health) = get_json(&h.app, "/api/health").await;
    assert_eq!(health["store_configured"], true);
}

#[tokio::test]
async fn test_same_content_is_not_uploaded_twice() {
    let h = harness();
    let attachment = json!([{"mime_type": "application/pdf", "data": STANDARD.encode(PDF_BYTES)}]);

    let (_, first) = post_json(&h.app, "/api/chat", json!({"message": "", "attachments": attachment.clone()})).await;
    let session_id = first["session_id"].clone();
    let (_, second) = post_json(
        &h.app,
        "/api/chat",
        json!({"session_id": session_id, "message": "index it again", "attachments": attachment}),
    )
    .await;

    assert_eq!(second["destination"], "file-manager");
    assert_eq!(final_text(&second["events"]), "Everything is already indexed.");
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_file_question_routes_to_file_manager() {
    let h = harness();
    let (status, body) = post_json(&h.app, "/api/chat", json!({"message": "quais arquivos eu enviei?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "file-manager");
    assert_eq!(final_text(&body["events"]), "Everything is already indexed.");
}

#[tokio::test]
async fn test_question_without_store_reports_error() {
    let h = harness();
    let (status, body) = post_json(&h.app, "/api/chat", json!({"message": "How did revenue change?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "search");

    let tool_event = &body["events"][1];
    let response = &tool_event["content"]["parts"][0]["functionResponse"]["response"];
    assert_eq!(response["status"], "error");
    assert!(response["message"].as_str().unwrap().starts_with("No file store configured"));
    assert_eq!(response["answer"], "");
    assert_eq!(response["sources"], json!([]));
}

#[tokio::test]
async fn test_multipart_upload_is_indexed_by_name() {
    let h = harness();
    let (status, created) = post_json(&h.app, "/api/sessions", json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let mut body = Vec::new();
    body.extend_from_slice(b"--XBOUNDARY\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"report.pdf\"\r\n");
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(PDF_BYTES);
    body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");
    let request = Request::post(format!("/api/sessions/{}/files", session_id))
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(body))
        .unwrap();
    let (status, bytes) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    let uploaded: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(uploaded["files"][0]["name"], "report.pdf");
    assert_eq!(uploaded["files"][0]["mime_type"], "application/pdf");

    let (_, body) = post_json(
        &h.app,
        "/api/chat",
        json!({"session_id": session_id, "message": "index my arquivo"}),
    )
    .await;
    assert_eq!(body["destination"], "file-manager");
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);

    let saved = h.config_store.load().await.unwrap().unwrap();
    assert_eq!(saved.uploaded_files, vec![content_filename(PDF_BYTES, "application/pdf")]);
}

#[tokio::test]
async fn test_named_attachment_is_listed_once_and_stays_indexed() {
    let h = harness();
    let (_, first) = post_json(
        &h.app,
        "/api/chat",
        json!({
            "message": "",
            "attachments": [{"filename": "report.pdf", "mime_type": "application/pdf", "data": STANDARD.encode(PDF_BYTES)}]
        }),
    )
    .await;
    assert_eq!(first["destination"], "file-manager");
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);

    let (_, second) = post_json(
        &h.app,
        "/api/chat",
        json!({"session_id": first["session_id"].clone(), "message": "quais arquivos eu enviei?"}),
    )
    .await;
    assert_eq!(second["destination"], "file-manager");

    let listing = &second["events"][1]["content"]["parts"][0]["functionResponse"]["response"];
    assert_eq!(listing["uploaded_files"], json!(["report.pdf"]));
    assert_eq!(listing["not_indexed"], json!([]));
    assert_eq!(final_text(&second["events"]), "Everything is already indexed.");
    assert_eq!(h.backend.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stream_relays_route_events_and_done() {
    let h = harness();
    let request = Request::post("/api/chat/stream")
        .header("content-type", "application/json")
        .body(Body::from(json!({"message": "what is in my documents?"}).to_string()))
        .unwrap();
    let (status, bytes) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(bytes).unwrap().replace("event: ", "event:");
    let route = text.find("event:route").unwrap();
    let first_event = text.find("event:event").unwrap();
    let done = text.find("event:done").unwrap();
    assert!(route < first_event && first_event < done);
    assert!(text.contains("\"destination\":\"search\""));
}

#[tokio::test]
async fn test_bad_requests() {
    let h = harness();

    let (status, body) = post_json(&h.app, "/api/chat", json!({"message": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = post_json(
        &h.app,
        "/api/chat",
        json!({"message": "x", "attachments": [{"mime_type": "application/pdf", "data": "not base64!"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&h.app, "/api/sessions/00000000-0000-0000-0000-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
