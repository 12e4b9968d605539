//! Generation gateway and model registry.
//!
//! [`GenerationBackend`] is the seam to the local language-model server;
//! [`OllamaBackend`] speaks the Ollama HTTP API (`GET /tags`,
//! `POST /generate`). [`ModelRegistry`] holds the currently selected model,
//! chosen lazily from the backend's model list the first time it is needed.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::BackendConfig;
use crate::models::ModelDescriptor;

/// Returned when the backend answers 200 without a `response` field.
pub const FALLBACK_RESPONSE: &str = "Sorry, I couldn't process your request.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The backend answered with a non-success status.
    #[error("Ollama returned status {status}")]
    Status { status: u16, body: String },
    /// The request never produced a usable response (connect, timeout, decode).
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}

/// A local model server that can list its models and complete prompts.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError>;

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, GatewayError>;
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

/// Ollama HTTP API client.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    list_timeout: Duration,
    generate_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            list_timeout: config.list_timeout(),
            generate_timeout: config.generate_timeout(),
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/tags", self.base_url))
            .timeout(self.list_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = response.json().await?;
        // Entries without a name are skipped rather than failing the list.
        Ok(tags
            .models
            .into_iter()
            .filter_map(|m| serde_json::from_value::<ModelDescriptor>(m).ok())
            .collect())
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or(FALLBACK_RESPONSE)
            .to_string())
    }
}

/// Picks the first preferred model present in `available`, else the first
/// available model. A preference matches a name exactly, as `pref:tag`, or
/// as a substring, in that order of strength.
pub fn choose_default_model(available: &[String], preferred: &[String]) -> Option<String> {
    for pref in preferred {
        let hit = available
            .iter()
            .find(|name| *name == pref)
            .or_else(|| available.iter().find(|name| name.starts_with(&format!("{}:", pref))))
            .or_else(|| available.iter().find(|name| name.contains(pref.as_str())));
        if let Some(name) = hit {
            return Some(name.clone());
        }
    }
    available.first().cloned()
}

/// The current model name, initialised once from the backend.
pub struct ModelRegistry {
    current: RwLock<Option<String>>,
    preferred: Vec<String>,
    fallback: String,
}

impl ModelRegistry {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            current: RwLock::new(None),
            preferred: config.preferred_models.clone(),
            fallback: config.fallback_model.clone(),
        }
    }

    /// Returns the current model, choosing one from the backend first if
    /// none has been selected yet.
    pub async fn current(&self, backend: &dyn GenerationBackend) -> String {
        if let Some(model) = self.current.read().await.as_ref() {
            return model.clone();
        }
        let mut slot = self.current.write().await;
        if let Some(model) = slot.as_ref() {
            return model.clone();
        }
        let chosen = self.pick_default(backend).await;
        tracing::info!(model = %chosen, "default model selected");
        *slot = Some(chosen.clone());
        chosen
    }

    /// Chooses and stores a default model, replacing any current selection.
    pub async fn init_default(&self, backend: &dyn GenerationBackend) -> String {
        let chosen = self.pick_default(backend).await;
        tracing::info!(model = %chosen, "default model selected");
        *self.current.write().await = Some(chosen.clone());
        chosen
    }

    /// Returns the current model, choosing one from an already fetched
    /// listing if none has been selected yet. Lets a caller that needs the
    /// listing anyway avoid a second backend round trip.
    pub async fn current_or_choose(
        &self,
        listing: &Result<Vec<ModelDescriptor>, GatewayError>,
    ) -> String {
        if let Some(model) = self.current.read().await.as_ref() {
            return model.clone();
        }
        let mut slot = self.current.write().await;
        if let Some(model) = slot.as_ref() {
            return model.clone();
        }
        let chosen = self.choose_from(listing);
        tracing::info!(model = %chosen, "default model selected");
        *slot = Some(chosen.clone());
        chosen
    }

    /// Sets the current model, stored exactly as given. Returns `None` for
    /// an empty name.
    pub async fn set(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        *self.current.write().await = Some(name.to_string());
        tracing::info!(model = %name, "model changed");
        Some(name.to_string())
    }

    async fn pick_default(&self, backend: &dyn GenerationBackend) -> String {
        self.choose_from(&backend.list_models().await)
    }

    fn choose_from(&self, listing: &Result<Vec<ModelDescriptor>, GatewayError>) -> String {
        match listing {
            Ok(models) => {
                let names: Vec<String> = models.iter().map(|m| m.name.clone()).collect();
                choose_default_model(&names, &self.preferred)
                    .unwrap_or_else(|| self.fallback.clone())
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = %self.fallback, "could not list models");
                self.fallback.clone()
            }
        }
    }
}
