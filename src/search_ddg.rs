//! DuckDuckGo HTML endpoint scraper (secondary provider).
//!
//! The query is POSTed as a form to the no-JavaScript results page. Networks
//! that intercept TLS often break the HTTPS request; in that case the same
//! form is sent once more over plain HTTP.

use async_trait::async_trait;
use scraper::Html;

use crate::config::{DuckDuckGoConfig, SearchConfig};
use crate::models::{SearchResult, SearchSource};
use crate::search::{compile_selector, element_text, http_client, read_page, SearchError, SearchProvider};

const PROVIDER: &str = "duckduckgo";

pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    layout: DuckDuckGoConfig,
    max_results: usize,
}

impl DuckDuckGoProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http_client(config)?,
            layout: config.duckduckgo.clone(),
            max_results: config.max_results,
        })
    }

    async fn post(&self, url: &str, query: &str) -> Result<reqwest::Response, reqwest::Error> {
        let form = [
            ("q", query),
            ("s", "0"),
            ("kl", self.layout.region.as_str()),
        ];
        self.client.post(url).form(&form).send().await
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let request_failed = |e: reqwest::Error| SearchError::Request {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        };

        let response = match self.post(&self.layout.url, query).await {
            Ok(response) => response,
            Err(e) if is_tls_error(&e) && self.layout.url.starts_with("https://") => {
                let plain = self.layout.url.replacen("https://", "http://", 1);
                tracing::warn!(error = %e, url = %plain, "TLS failure, retrying DuckDuckGo over HTTP");
                self.post(&plain, query).await.map_err(request_failed)?
            }
            Err(e) => return Err(request_failed(e)),
        };

        let body = read_page(PROVIDER, response, self.layout.min_body_chars).await?;
        parse_results(&body, &self.layout, self.max_results)
    }
}

/// Parses a DuckDuckGo HTML results page into at most `max` results.
pub fn parse_results(
    html: &str,
    layout: &DuckDuckGoConfig,
    max: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let result_sel = compile_selector(&layout.result_selector)?;
    let link_sel = compile_selector(&layout.link_selector)?;
    let snippet_sel = compile_selector(&layout.snippet_selector)?;

    let document = Html::parse_document(html);
    let mut results = Vec::new();
    for container in document.select(&result_sel).take(max) {
        let Some(link) = container.select(&link_sel).next() else {
            continue;
        };
        // The result link is also the title element.
        let title = element_text(&link);
        let url = link.value().attr("href").unwrap_or_default().to_string();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let snippet = container
            .select(&snippet_sel)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        results.push(SearchResult {
            source: SearchSource::DuckDuckGo,
            title,
            url,
            snippet,
        });
    }
    Ok(results)
}

/// Whether a request failed while establishing TLS.
///
/// reqwest does not expose a TLS error kind. rustls failures surface in the
/// source chain of a connect error as an `io::Error` of kind `InvalidData`
/// (tokio-rustls wraps every protocol error that way). Message matching is
/// kept for connectors that report certificate problems as plain text.
pub fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if err.is_connect() {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::InvalidData {
                    return true;
                }
            }
        }
        let msg = e.to_string().to_lowercase();
        if ["tls", "ssl", "certificate", "handshake", "corrupt message"]
            .iter()
            .any(|needle| msg.contains(needle))
        {
            return true;
        }
        source = e.source();
    }
    false
}
