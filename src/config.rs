//! TOML configuration.
//!
//! Every section is optional; a missing file or an empty one yields the
//! defaults below, which match a stock local Ollama install and the public
//! Google / DuckDuckGo HTML result pages.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub contexts: ContextsConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

/// Local generation backend (Ollama HTTP API).
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Used when the backend cannot be queried or reports no models.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_preferred_models")]
    pub preferred_models: Vec<String>,
    #[serde(default = "default_list_timeout_secs")]
    pub list_timeout_secs: u64,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fallback_model: default_fallback_model(),
            preferred_models: default_preferred_models(),
            list_timeout_secs: default_list_timeout_secs(),
            generate_timeout_secs: default_generate_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:11434/api".to_string()
}
fn default_fallback_model() -> String {
    "mistral".to_string()
}
fn default_preferred_models() -> Vec<String> {
    ["qwen", "mistral", "llama2", "neural-chat"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_list_timeout_secs() -> u64 {
    5
}
fn default_generate_timeout_secs() -> u64 {
    60
}

/// Uploaded document storage and prompt inclusion.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextsConfig {
    #[serde(default = "default_contexts_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Characters of each document's text included in a prompt.
    #[serde(default = "default_max_chars_per_file")]
    pub max_chars_per_file: usize,
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            dir: default_contexts_dir(),
            allowed_extensions: default_allowed_extensions(),
            max_chars_per_file: default_max_chars_per_file(),
        }
    }
}

fn default_contexts_dir() -> PathBuf {
    PathBuf::from("./contexts")
}
fn default_allowed_extensions() -> Vec<String> {
    [".txt", ".md", ".pdf", ".html", ".htm", ".docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_chars_per_file() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub duckduckgo: DuckDuckGoConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
            user_agent: default_user_agent(),
            google: GoogleConfig::default(),
            duckduckgo: DuckDuckGoConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_search_timeout_secs() -> u64 {
    10
}
fn default_max_results() -> usize {
    5
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

/// Layout knobs for the Google results page scraper.
#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    /// `{query}` is replaced by the form-encoded query (spaces become `+`).
    #[serde(default = "default_google_url_template")]
    pub url_template: String,
    /// Links whose host contains this are skipped by the fallback parse.
    #[serde(default = "default_google_own_domain")]
    pub own_domain: String,
    #[serde(default = "default_google_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_google_result_selector")]
    pub result_selector: String,
    #[serde(default = "default_google_snippet_selectors")]
    pub snippet_selectors: Vec<String>,
    #[serde(default = "default_google_fallback_selector")]
    pub fallback_selector: String,
    #[serde(default = "default_min_fallback_text_chars")]
    pub min_fallback_text_chars: usize,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            url_template: default_google_url_template(),
            own_domain: default_google_own_domain(),
            min_body_chars: default_google_min_body_chars(),
            result_selector: default_google_result_selector(),
            snippet_selectors: default_google_snippet_selectors(),
            fallback_selector: default_google_fallback_selector(),
            min_fallback_text_chars: default_min_fallback_text_chars(),
        }
    }
}

fn default_google_url_template() -> String {
    "https://www.google.com/search?q={query}&hl=id&gl=ID&num=5".to_string()
}
fn default_google_own_domain() -> String {
    "google".to_string()
}
fn default_google_min_body_chars() -> usize {
    1000
}
fn default_google_result_selector() -> String {
    "a > h3".to_string()
}
fn default_google_snippet_selectors() -> Vec<String> {
    ["div.IsZvec", "span.aCOpRe", "div.VwiC3b"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_google_fallback_selector() -> String {
    r#"a[href^="http"]"#.to_string()
}
fn default_min_fallback_text_chars() -> usize {
    10
}

/// Layout knobs for the DuckDuckGo HTML endpoint scraper.
#[derive(Debug, Deserialize, Clone)]
pub struct DuckDuckGoConfig {
    #[serde(default = "default_ddg_url")]
    pub url: String,
    /// Value of the `kl` form field.
    #[serde(default = "default_ddg_region")]
    pub region: String,
    #[serde(default = "default_ddg_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_ddg_result_selector")]
    pub result_selector: String,
    #[serde(default = "default_ddg_link_selector")]
    pub link_selector: String,
    #[serde(default = "default_ddg_snippet_selector")]
    pub snippet_selector: String,
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            url: default_ddg_url(),
            region: default_ddg_region(),
            min_body_chars: default_ddg_min_body_chars(),
            result_selector: default_ddg_result_selector(),
            link_selector: default_ddg_link_selector(),
            snippet_selector: default_ddg_snippet_selector(),
        }
    }
}

fn default_ddg_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}
fn default_ddg_region() -> String {
    "id-id".to_string()
}
fn default_ddg_min_body_chars() -> usize {
    200
}
fn default_ddg_result_selector() -> String {
    ".result".to_string()
}
fn default_ddg_link_selector() -> String {
    "a.result__a".to_string()
}
fn default_ddg_snippet_selector() -> String {
    ".result__snippet".to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Checks the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            anyhow::bail!("server.bind must not be empty");
        }
        if self.search.max_results == 0 {
            anyhow::bail!("search.max_results must be >= 1");
        }
        if self.contexts.max_chars_per_file == 0 {
            anyhow::bail!("contexts.max_chars_per_file must be >= 1");
        }
        if !self.search.google.url_template.contains("{query}") {
            anyhow::bail!("search.google.url_template must contain {{query}}");
        }
        if self.search.timeout_secs == 0
            || self.backend.list_timeout_secs == 0
            || self.backend.generate_timeout_secs == 0
        {
            anyhow::bail!("timeouts must be > 0 seconds");
        }
        if self.backend.fallback_model.trim().is_empty() {
            anyhow::bail!("backend.fallback_model must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Loads `path` when it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}
