//! HTTP server for the chat UI and its JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Embedded chat page |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/models` | Backend models plus the current selection |
//! | `POST` | `/set-model` | Change the current model |
//! | `POST` | `/chat` | Run one chat turn |
//! | `POST` | `/upload-context` | Upload a document (multipart field `file`) |
//! | `GET`  | `/contexts` | List uploaded documents |
//! | `POST` | `/delete-context` | Remove uploaded documents by name |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "No model name provided", "code": "bad_request" }
//! ```
//!
//! Codes: `bad_request` (400), `upstream` (backend status passed through, with
//! the backend body in `details`), `internal` (500).
//!
//! JSON bodies are parsed leniently: an unparsable body counts as `{}`, so a
//! missing field is reported as the field's own 400 rather than a parse error.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::models::ContextSummary;
use crate::ollama::GatewayError;
use crate::service::{ChatReply, ChatService, ModelList, ServiceError};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
struct AppState {
    service: Arc<ChatService>,
}

/// Starts the server on `[server].bind` with the Ollama backend and both
/// scrapers. Picks the default model before accepting requests.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(ChatService::new(config.clone())?);
    let model = service.init_default_model().await;
    tracing::info!(model = %model, "using model");
    run_server_with_service(service).await
}

/// Serves an already-built service. Used by tests to inject fake backends.
pub async fn run_server_with_service(service: Arc<ChatService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "chat server listening");
    println!("Chat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full route table over `service`.
pub fn router(service: Arc<ChatService>) -> Router {
    let max_upload = service.config().server.max_upload_bytes;
    let state = AppState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/models", get(handle_models))
        .route("/set-model", post(handle_set_model))
        .route("/chat", post(handle_chat))
        .route("/upload-context", post(handle_upload))
        .route("/contexts", get(handle_contexts))
        .route("/delete-context", post(handle_delete))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        details: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
        details: None,
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::BadRequest(msg) => bad_request(msg),
            ServiceError::Upstream(GatewayError::Status { status, body }) => {
                let message = format!("Ollama returned status {}", status);
                tracing::warn!(status, "generation backend returned an error");
                AppError {
                    status: StatusCode::from_u16(status)
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    code: "upstream",
                    message,
                    details: Some(body),
                }
            }
            ServiceError::Upstream(GatewayError::Transport(msg)) => {
                tracing::warn!(error = %msg, "generation backend unreachable");
                internal(msg)
            }
            ServiceError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                internal(e.to_string())
            }
        }
    }
}

/// Decodes a JSON body, treating anything unparsable as an empty object.
fn lenient_json<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

// ============ GET / and /health ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Models ============

async fn handle_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(state.service.list_models().await)
}

#[derive(Deserialize, Default)]
struct SetModelRequest {
    model: Option<String>,
}

#[derive(Serialize)]
struct SetModelResponse {
    success: bool,
    current_model: String,
}

async fn handle_set_model(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SetModelResponse>, AppError> {
    let request: SetModelRequest = lenient_json(&body);
    let current_model = state.service.set_model(request.model.as_deref()).await?;
    Ok(Json(SetModelResponse {
        success: true,
        current_model,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize, Default)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    search: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatReply>, AppError> {
    let request: ChatRequest = lenient_json(&body);
    let reply = state
        .service
        .chat(&request.message, request.search, None)
        .await?;
    Ok(Json(reply))
}

// ============ Contexts ============

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    filename: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("No file part"))?;
    let filename = state.service.upload_context(&filename, Vec::from(bytes)).await?;
    Ok(Json(UploadResponse {
        success: true,
        filename,
    }))
}

#[derive(Serialize)]
struct ContextsResponse {
    contexts: Vec<ContextSummary>,
}

async fn handle_contexts(State(state): State<AppState>) -> Json<ContextsResponse> {
    Json(ContextsResponse {
        contexts: state.service.list_contexts().await,
    })
}

#[derive(Deserialize, Default)]
struct DeleteRequest {
    filename: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn handle_delete(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DeleteResponse>, AppError> {
    let request: DeleteRequest = lenient_json(&body);
    let success = state
        .service
        .delete_context(request.filename.as_deref())
        .await?;
    Ok(Json(DeleteResponse { success }))
}
