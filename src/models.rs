//! Core data models shared by the store, the search providers, the prompt
//! assembler and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// An uploaded document kept in memory for prompt assembly.
#[derive(Debug, Clone)]
pub struct ContextRecord {
    /// Sanitized filename. Not unique: re-uploads are appended.
    pub filename: String,
    pub storage_path: PathBuf,
    /// Full extracted text; truncated only when rendered into a prompt.
    pub content: String,
}

/// The listing view of a [`ContextRecord`], as returned by `GET /contexts`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContextSummary {
    pub filename: String,
    pub path: String,
}

impl From<&ContextRecord> for ContextSummary {
    fn from(record: &ContextRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            path: record.storage_path.display().to_string(),
        }
    }
}

/// Which scraper (and which strategy) produced a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchSource {
    Google,
    GoogleFallback,
    DuckDuckGo,
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchSource::Google => "Google",
            SearchSource::GoogleFallback => "Google-Fallback",
            SearchSource::DuckDuckGo => "DuckDuckGo",
        };
        f.write_str(label)
    }
}

/// A single scraped web result. Lives for one chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub source: SearchSource,
    pub title: String,
    pub url: String,
    /// May be empty when no snippet container was found.
    pub snippet: String,
}

/// A model advertised by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

impl ModelDescriptor {
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: default_tag(),
        }
    }
}

fn default_tag() -> String {
    "latest".to_string()
}
