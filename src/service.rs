//! The chat service: one owned value holding everything a request touches.
//!
//! [`ChatService`] owns the context store, the model registry, the search
//! providers and the generation backend. The HTTP server and the CLI both
//! drive it; tests build it with fake providers and backends through
//! [`ChatService::with_parts`].

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::extract::{extract_text, is_allowed};
use crate::models::{ContextRecord, ContextSummary, ModelDescriptor};
use crate::ollama::{GatewayError, GenerationBackend, ModelRegistry, OllamaBackend};
use crate::prompt;
use crate::search::WebSearch;
use crate::store::{sanitize_filename, save_upload, ContextStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input from the caller (HTTP 400).
    #[error("{0}")]
    BadRequest(String),
    /// The generation backend failed; carries its status when it answered.
    #[error(transparent)]
    Upstream(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// `GET /models` payload. `error` is set when the backend could not be listed.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<ModelDescriptor>,
    pub current_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The assembled prompt plus the rendered search block, if any.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub search_context: Option<String>,
}

/// Result of a successful chat turn.
#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(rename = "searchPerformed")]
    pub search_performed: bool,
    #[serde(rename = "searchContext")]
    pub search_context: Option<String>,
}

pub struct ChatService {
    config: Arc<Config>,
    contexts: RwLock<ContextStore>,
    models: ModelRegistry,
    search: WebSearch,
    backend: Arc<dyn GenerationBackend>,
}

impl ChatService {
    /// Builds the service with the Ollama backend and both web scrapers.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let backend = OllamaBackend::new(&config.backend)?;
        let search = WebSearch::from_config(&config.search)?;
        Ok(Self::with_parts(config, Arc::new(backend), search))
    }

    pub fn with_parts(
        config: Config,
        backend: Arc<dyn GenerationBackend>,
        search: WebSearch,
    ) -> Self {
        let models = ModelRegistry::new(&config.backend);
        Self {
            config: Arc::new(config),
            contexts: RwLock::new(ContextStore::new()),
            models,
            search,
            backend,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ============ Models ============

    pub async fn current_model(&self) -> String {
        self.models.current(self.backend.as_ref()).await
    }

    pub async fn init_default_model(&self) -> String {
        self.models.init_default(self.backend.as_ref()).await
    }

    /// Lists backend models; never fails. On error or an empty list the
    /// current model is reported alone. A single backend request serves both
    /// the listing and, on first use, the default model choice.
    pub async fn list_models(&self) -> ModelList {
        let listing = self.backend.list_models().await;
        let current_model = self.models.current_or_choose(&listing).await;
        let (models, error) = match listing {
            Ok(models) if !models.is_empty() => (models, None),
            Ok(_) => (vec![ModelDescriptor::latest(current_model.clone())], None),
            Err(e) => {
                tracing::warn!(error = %e, "model listing failed");
                (
                    vec![ModelDescriptor::latest(current_model.clone())],
                    Some(e.to_string()),
                )
            }
        };
        ModelList {
            models,
            current_model,
            error,
        }
    }

    pub async fn set_model(&self, name: Option<&str>) -> Result<String, ServiceError> {
        let name = name.unwrap_or_default();
        self.models
            .set(name)
            .await
            .ok_or_else(|| ServiceError::BadRequest("No model name provided".to_string()))
    }

    // ============ Contexts ============

    /// Validates, extracts, saves and stores an uploaded document.
    /// Returns the sanitized filename.
    pub async fn upload_context(
        &self,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ServiceError> {
        if original_name.is_empty() {
            return Err(ServiceError::BadRequest("No selected file".to_string()));
        }
        if !is_allowed(original_name, &self.config.contexts.allowed_extensions) {
            return Err(ServiceError::BadRequest("File type not allowed".to_string()));
        }
        let filename = sanitize_filename(original_name);
        if filename.is_empty() || !is_allowed(&filename, &self.config.contexts.allowed_extensions)
        {
            return Err(ServiceError::BadRequest("Invalid filename".to_string()));
        }

        // PDF parsing and the file write both block; keep them off the runtime.
        let dir = self.config.contexts.dir.clone();
        let name = filename.clone();
        let size = bytes.len();
        let (storage_path, content) = tokio::task::spawn_blocking(move || {
            let content = extract_text(&bytes, &name);
            save_upload(&dir, &name, &bytes)
                .map(|path| (path, content))
                .map_err(|e| anyhow::anyhow!("failed to save {}: {}", name, e))
        })
        .await
        .map_err(|e| anyhow::anyhow!("upload task failed: {}", e))??;

        tracing::info!(
            filename = %filename,
            bytes = size,
            chars = content.chars().count(),
            "context uploaded"
        );
        self.contexts.write().await.add(ContextRecord {
            filename: filename.clone(),
            storage_path,
            content,
        });
        Ok(filename)
    }

    pub async fn list_contexts(&self) -> Vec<ContextSummary> {
        self.contexts.read().await.list()
    }

    /// Removes every stored document named `filename`. `Ok(false)` when none matched.
    pub async fn delete_context(&self, filename: Option<&str>) -> Result<bool, ServiceError> {
        let filename = filename
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("filename required".to_string()))?;
        let outcome = self.contexts.write().await.remove(filename);
        if outcome.any_removed() {
            tracing::info!(
                filename = %filename,
                removed = outcome.removed,
                orphaned_files = outcome.file_errors.len(),
                "context deleted"
            );
        }
        Ok(outcome.any_removed())
    }

    // ============ Chat ============

    /// Builds the prompt for `message`: instruction, stored documents,
    /// optional web search, then the question.
    pub async fn prepare_prompt(&self, message: &str, include_search: bool) -> PreparedPrompt {
        let today = prompt::format_today(Local::now().date_naive());
        let instruction = prompt::system_instruction(&today);

        let rag = {
            let store = self.contexts.read().await;
            prompt::rag_block(store.records(), self.config.contexts.max_chars_per_file)
        };

        let search_context = if include_search {
            let outcome = self.search.gather(message).await;
            if let Err(e) = &outcome {
                tracing::warn!(error = %e, "web search failed");
            }
            Some(prompt::search_block(&outcome))
        } else {
            None
        };

        PreparedPrompt {
            prompt: prompt::assemble(
                &instruction,
                rag.as_deref(),
                search_context.as_deref(),
                message,
            ),
            search_context,
        }
    }

    /// Runs one chat turn against `model`, or the current model when `None`.
    pub async fn chat(
        &self,
        message: &str,
        include_search: bool,
        model: Option<&str>,
    ) -> Result<ChatReply, ServiceError> {
        let model = match model {
            Some(m) => m.to_string(),
            None => self.current_model().await,
        };
        let prepared = self.prepare_prompt(message, include_search).await;
        tracing::debug!(model = %model, prompt_chars = prepared.prompt.len(), "generating");

        let response = self.backend.generate(&prepared.prompt, &model).await?;
        Ok(ChatReply {
            response,
            search_performed: include_search,
            search_context: prepared.search_context,
        })
    }
}
