//! End-to-end tests for the HTTP API.
//!
//! Each test starts the real server on a free port. The generation backend is
//! either a small axum app imitating Ollama (it echoes the prompt back as the
//! response) or an address nothing listens on.

use axum::{http::StatusCode, routing::get, routing::post, Json, Router};
use rag_chat::config::Config;
use rag_chat::server::run_server_with_service;
use rag_chat::service::ChatService;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn fake_generate(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["model"] == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "model 'missing' not found"})),
        );
    }
    (StatusCode::OK, Json(json!({ "response": body["prompt"] })))
}

/// Starts an Ollama look-alike and returns its `/api` base URL.
async fn start_fake_backend() -> String {
    let app = Router::new()
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({
                    "models": [
                        {"name": "llama2:7b", "tag": "7b"},
                        {"name": "qwen2.5:3b"}
                    ]
                }))
            }),
        )
        .route("/api/generate", post(fake_generate));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/api", addr)
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
    _tmp: TempDir,
}

impl TestServer {
    async fn start(backend_url: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();

        let mut config = Config::minimal();
        config.server.bind = format!("127.0.0.1:{}", port);
        config.backend.base_url = backend_url.to_string();
        config.backend.list_timeout_secs = 2;
        config.backend.generate_timeout_secs = 5;
        config.contexts.dir = tmp.path().join("contexts");

        let service = Arc::new(ChatService::new(config).unwrap());
        let handle = tokio::spawn(async move {
            run_server_with_service(service).await.unwrap();
        });
        wait_for_server(port).await;

        Self {
            base: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            handle,
            _tmp: tmp,
        }
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn upload(&self, filename: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(format!("{}/upload-context", self.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const UNREACHABLE: &str = "http://127.0.0.1:1/api";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn index_page_is_served() {
    let server = TestServer::start(UNREACHABLE).await;
    let html = server
        .client
        .get(format!("{}/", server.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("<title>RAG Chat</title>"));
}

#[tokio::test]
async fn set_model_without_name_is_rejected() {
    let server = TestServer::start(UNREACHABLE).await;

    let (status, body) = server.post_json("/set-model", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert!(!body["error"].as_str().unwrap().is_empty());

    let (status, body) = server.post_json("/set-model", json!({"model": "phi3"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["current_model"], "phi3");
}

#[tokio::test]
async fn uploaded_text_file_is_listed_and_deletable() {
    let server = TestServer::start(UNREACHABLE).await;

    let (status, body) = server.upload("notes.txt", b"hello world").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "notes.txt");

    let listed = server.get_json("/contexts").await;
    let contexts = listed["contexts"].as_array().unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["filename"], "notes.txt");
    assert!(contexts[0]["path"].as_str().unwrap().ends_with("notes.txt"));

    let (_, body) = server
        .post_json("/delete-context", json!({"filename": "other.txt"}))
        .await;
    assert_eq!(body["success"], false);

    let (_, body) = server
        .post_json("/delete-context", json!({"filename": "notes.txt"}))
        .await;
    assert_eq!(body["success"], true);
    assert!(server.get_json("/contexts").await["contexts"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn upload_rejects_disallowed_extension() {
    let server = TestServer::start(UNREACHABLE).await;

    let (status, body) = server.upload("tool.exe", b"MZ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed");
}

#[tokio::test]
async fn delete_without_filename_is_rejected() {
    let server = TestServer::start(UNREACHABLE).await;
    let (status, _) = server.post_json("/delete-context", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_against_unreachable_backend_is_a_500() {
    let server = TestServer::start(UNREACHABLE).await;

    let (status, body) = server
        .post_json("/chat", json!({"message": "hi", "search": false}))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn models_fall_back_to_current_when_backend_is_down() {
    let server = TestServer::start(UNREACHABLE).await;

    let body = server.get_json("/models").await;
    assert_eq!(body["current_model"], "mistral");
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["name"], "mistral");
    assert_eq!(models[0]["tag"], "latest");
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn models_lists_backend_and_prefers_configured_order() {
    let backend = start_fake_backend().await;
    let server = TestServer::start(&backend).await;

    let body = server.get_json("/models").await;
    assert_eq!(body["current_model"], "qwen2.5:3b");
    assert_eq!(body["models"].as_array().unwrap().len(), 2);
    assert_eq!(body["models"][1]["tag"], "latest");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn bare_chat_prompt_is_instruction_and_question() {
    let backend = start_fake_backend().await;
    let server = TestServer::start(&backend).await;

    let (status, body) = server
        .post_json("/chat", json!({"message": "what is rust?", "search": false}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["searchPerformed"], false);
    assert!(body["searchContext"].is_null());

    let prompt = body["response"].as_str().unwrap();
    assert!(prompt.starts_with("You are a helpful AI assistant. Today is "));
    assert!(prompt.ends_with("\n\nUser question: what is rust?"));
    assert_eq!(prompt.matches("\n\n").count(), 1);
}

#[tokio::test]
async fn chat_prompt_includes_uploaded_context() {
    let backend = start_fake_backend().await;
    let server = TestServer::start(&backend).await;
    server.upload("notes.txt", b"hello world").await;

    let (status, body) = server
        .post_json("/chat", json!({"message": "summarize"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let prompt = body["response"].as_str().unwrap();
    assert!(prompt.contains("Uploaded context files:\n\nFile: notes.txt\nhello world\n\n"));
    assert!(prompt.ends_with("User question: summarize"));
}

#[tokio::test]
async fn backend_error_status_is_passed_through() {
    let backend = start_fake_backend().await;
    let server = TestServer::start(&backend).await;
    server.post_json("/set-model", json!({"model": "missing"})).await;

    let (status, body) = server.post_json("/chat", json!({"message": "hi"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Ollama returned status 404");
    assert!(body["details"].as_str().unwrap().contains("not found"));
}
