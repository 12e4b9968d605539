//! Web search over scraped HTML result pages.
//!
//! Each engine implements [`SearchProvider`]. [`WebSearch`] runs the
//! configured providers in order (Google, then DuckDuckGo) and concatenates
//! their results, so citation priority follows provider order and then page
//! order within a provider.
//!
//! Scraping is best-effort: network failures, non-200 responses and
//! suspiciously short pages are [recoverable](SearchError::is_recoverable)
//! and become an empty contribution plus a log line. Only a broken selector
//! (which comes from configuration) aborts the whole search.

use async_trait::async_trait;
use scraper::{ElementRef, Selector};

use crate::config::SearchConfig;
use crate::models::SearchResult;
use crate::search_ddg::DuckDuckGoProvider;
use crate::search_google::GoogleProvider;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },
    #[error("{provider} returned status {status}")]
    Status { provider: String, status: u16 },
    #[error("{provider} returned a page too short to contain results ({chars} chars)")]
    ShortBody { provider: String, chars: usize },
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl SearchError {
    /// Recoverable errors cost one provider its results for this request;
    /// anything else aborts the search.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::Request { .. } | SearchError::Status { .. } | SearchError::ShortBody { .. }
        )
    }
}

/// A web search engine that turns a free-text query into ranked results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Returns at most the configured number of results, in page order.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

/// Runs several providers in sequence and merges their output.
pub struct WebSearch {
    providers: Vec<Box<dyn SearchProvider>>,
}

impl WebSearch {
    pub fn new(providers: Vec<Box<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    /// Google then DuckDuckGo, both configured from `config`.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self::new(vec![
            Box::new(GoogleProvider::new(config)?),
            Box::new(DuckDuckGoProvider::new(config)?),
        ]))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Queries every provider in order and concatenates the results.
    pub async fn gather(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let mut results = Vec::new();
        for provider in &self.providers {
            match provider.search(query).await {
                Ok(found) => {
                    tracing::debug!(provider = provider.name(), count = found.len(), "search done");
                    results.extend(found);
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(provider = provider.name(), error = %e, "search provider failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}

/// Parses a CSS selector, mapping the borrowed parse error into [`SearchError`].
pub(crate) fn compile_selector(selector: &str) -> Result<Selector, SearchError> {
    Selector::parse(selector).map_err(|e| SearchError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Visible text of an element with whitespace runs collapsed to single spaces.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the shared HTTP client for a scraper.
pub(crate) fn http_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .build()
        .map_err(|e| SearchError::Client(e.to_string()))
}

/// Reads a response body, rejecting non-200 statuses and bodies with no more
/// than `min_chars` characters.
pub(crate) async fn read_page(
    provider: &str,
    response: reqwest::Response,
    min_chars: usize,
) -> Result<String, SearchError> {
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(SearchError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(|e| SearchError::Request {
        provider: provider.to_string(),
        message: e.to_string(),
    })?;
    let chars = body.chars().count();
    if chars <= min_chars {
        return Err(SearchError::ShortBody {
            provider: provider.to_string(),
            chars,
        });
    }
    Ok(body)
}
