//! Google results-page scraper (primary provider).
//!
//! Two strategies, tried in order:
//!
//! 1. **Headings**: every anchor wrapping an `h3` is a result. Redirect
//!    links (`/url?q=<target>&…`) are unwrapped, and a snippet is looked for
//!    in the element following the anchor or one of its first ancestors.
//! 2. **Fallback**: when (1) finds nothing, any external `http` anchor with
//!    enough visible text is taken as a bare result, skipping Google's own
//!    links.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use scraper::{ElementRef, Html, Selector};

use crate::config::{GoogleConfig, SearchConfig};
use crate::models::{SearchResult, SearchSource};
use crate::search::{compile_selector, element_text, http_client, read_page, SearchError, SearchProvider};

const PROVIDER: &str = "google";

/// Sibling/parent steps taken when looking for a snippet.
const SNIPPET_WALK_STEPS: usize = 4;

pub struct GoogleProvider {
    client: reqwest::Client,
    layout: GoogleConfig,
    max_results: usize,
}

impl GoogleProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http_client(config)?,
            layout: config.google.clone(),
            max_results: config.max_results,
        })
    }

    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.layout.url_template.replace("{query}", &encoded)
    }
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let url = self.search_url(query);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SearchError::Request {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;
        let body = read_page(PROVIDER, response, self.layout.min_body_chars).await?;
        parse_results(&body, &self.layout, self.max_results)
    }
}

/// Parses a Google results page into at most `max` results.
pub fn parse_results(
    html: &str,
    layout: &GoogleConfig,
    max: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let result_sel = compile_selector(&layout.result_selector)?;
    let snippet_sels = layout
        .snippet_selectors
        .iter()
        .map(|s| compile_selector(s))
        .collect::<Result<Vec<_>, _>>()?;
    let fallback_sel = compile_selector(&layout.fallback_selector)?;

    let document = Html::parse_document(html);
    let results = parse_headings(&document, &result_sel, &snippet_sels, max);
    if !results.is_empty() {
        return Ok(results);
    }

    let fallback = parse_fallback(&document, &fallback_sel, layout, max);
    if fallback.is_empty() {
        tracing::debug!("no Google result headings or usable links; layout may differ or request was blocked");
    }
    Ok(fallback)
}

fn parse_headings(
    document: &Html,
    result_sel: &Selector,
    snippet_sels: &[Selector],
    max: usize,
) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for heading in document.select(result_sel) {
        if results.len() >= max {
            break;
        }
        let Some(anchor) = heading.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let title = element_text(&heading);
        let url = normalize_href(anchor.value().attr("href").unwrap_or_default());
        if title.is_empty() || !url.starts_with("http") {
            continue;
        }
        results.push(SearchResult {
            source: SearchSource::Google,
            title,
            url,
            snippet: find_snippet(anchor, snippet_sels).unwrap_or_default(),
        });
    }
    results
}

fn parse_fallback(
    document: &Html,
    link_sel: &Selector,
    layout: &GoogleConfig,
    max: usize,
) -> Vec<SearchResult> {
    document
        .select(link_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let text = element_text(&a);
            if text.chars().count() < layout.min_fallback_text_chars {
                return None;
            }
            let host = url::Url::parse(href).ok()?.host_str()?.to_string();
            if host.contains(&layout.own_domain) {
                return None;
            }
            Some(SearchResult {
                source: SearchSource::GoogleFallback,
                title: text,
                url: href.to_string(),
                snippet: String::new(),
            })
        })
        .take(max)
        .collect()
}

/// Unwraps `/url?q=<target>` redirect links and percent-decodes the result.
pub fn normalize_href(href: &str) -> String {
    let target = if href.starts_with("/url?") {
        href.split_once('?')
            .and_then(|(_, query)| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "q")
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_else(|| href.to_string())
    } else {
        href.to_string()
    };
    percent_decode_str(&target).decode_utf8_lossy().into_owned()
}

/// Walks from `anchor` through next siblings and ancestors looking for the
/// first descendant matching any snippet selector.
fn find_snippet(anchor: ElementRef<'_>, snippet_sels: &[Selector]) -> Option<String> {
    let mut container = Some(anchor);
    for _ in 0..SNIPPET_WALK_STEPS {
        let current = container?;
        if let Some(sibling) = current.next_siblings().find_map(ElementRef::wrap) {
            let hit = snippet_sels
                .iter()
                .find_map(|sel| sibling.select(sel).next());
            if let Some(el) = hit {
                return Some(element_text(&el));
            }
        }
        container = current.parent().and_then(ElementRef::wrap);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GoogleConfig {
        GoogleConfig::default()
    }

    fn entry(href: &str, title: &str, snippet: &str) -> String {
        format!(
            r#"<div class="g"><div class="yuRUbf"><a href="{}"><h3>{}</h3></a></div>
               <div class="s"><div class="VwiC3b">{}</div></div></div>"#,
            href, title, snippet
        )
    }

    #[test]
    fn headings_with_redirect_links_and_snippets() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            entry(
                "/url?q=https://www.rust-lang.org/learn%3Fx%3D1&sa=U",
                "Learn Rust",
                "Get started with Rust"
            ),
            entry("https://doc.rust-lang.org/book/", "The Book", "")
        );
        let results = parse_results(&html, &layout(), 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, SearchSource::Google);
        assert_eq!(results[0].title, "Learn Rust");
        assert_eq!(results[0].url, "https://www.rust-lang.org/learn?x=1");
        assert_eq!(results[0].snippet, "Get started with Rust");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn relative_links_and_empty_titles_are_skipped() {
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            entry("/search?q=more", "Internal", "x"),
            entry("https://example.com/", "", "x"),
            entry("https://example.org/", "Kept", "y")
        );
        let results = parse_results(&html, &layout(), 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Kept");
    }

    #[test]
    fn headings_are_capped() {
        let entries: String = (0..8)
            .map(|i| entry(&format!("https://example.com/{}", i), &format!("T{}", i), ""))
            .collect();
        let html = format!("<html><body>{}</body></html>", entries);
        let results = parse_results(&html, &layout(), 5).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[4].title, "T4");
    }

    #[test]
    fn fallback_takes_external_links_with_enough_text() {
        let html = r#"<html><body>
            <a href="https://www.google.com/preferences">Search settings page</a>
            <a href="https://short.example/">tiny</a>
            <a href="https://en.wikipedia.org/wiki/Rust">Rust (programming language)</a>
            <a href="/relative">Relative link with long text</a>
            <a href="https://blog.example.com/post">A long enough blog title</a>
        </body></html>"#;
        let results = parse_results(html, &layout(), 5).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.source == SearchSource::GoogleFallback));
        assert_eq!(results[0].url, "https://en.wikipedia.org/wiki/Rust");
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[1].url, "https://blog.example.com/post");
    }

    #[test]
    fn fallback_is_not_used_when_headings_exist() {
        let html = format!(
            r#"<html><body>{}<a href="https://other.example/">Another long link text</a></body></html>"#,
            entry("https://example.com/", "Heading", "")
        );
        let results = parse_results(&html, &layout(), 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, SearchSource::Google);
    }

    #[test]
    fn page_without_links_yields_nothing() {
        let results = parse_results("<html><body><p>blocked</p></body></html>", &layout(), 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn bad_snippet_selector_is_an_error() {
        let mut layout = layout();
        layout.snippet_selectors.push("div[".to_string());
        let err = parse_results("<html></html>", &layout, 5).unwrap_err();
        assert!(matches!(err, SearchError::Selector { .. }));
    }

    #[test]
    fn query_spaces_become_plus() {
        let provider = GoogleProvider::new(&SearchConfig::default()).unwrap();
        assert_eq!(
            provider.search_url("rust async traits"),
            "https://www.google.com/search?q=rust+async+traits&hl=id&gl=ID&num=5"
        );
        assert!(provider.search_url("a&b").contains("q=a%26b&"));
    }

    #[test]
    fn normalize_leaves_plain_links_decoded() {
        assert_eq!(
            normalize_href("https://example.com/a%20b"),
            "https://example.com/a b"
        );
        assert_eq!(normalize_href("/url?sa=U"), "/url?sa=U");
    }

    // ─── Against a local HTTP server ────────────────────────────────

    use crate::search::WebSearch;
    use axum::{extract::Query, http::StatusCode, routing::get, Router};
    use std::collections::HashMap;

    /// Serves `app` on an ephemeral port and returns a provider pointed at it.
    async fn provider_for(app: Router) -> GoogleProvider {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = SearchConfig::default();
        config.timeout_secs = 5;
        config.google.url_template = format!("http://{}/search?q={{query}}&num=5", addr);
        GoogleProvider::new(&config).unwrap()
    }

    fn padded_page(entries: &str) -> String {
        format!(
            "<html><head><title>results</title></head><body>{}<p>{}</p></body></html>",
            entries,
            "filler ".repeat(200)
        )
    }

    #[tokio::test]
    async fn live_page_yields_results_for_the_sent_query() {
        let app = Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let q = params.get("q").cloned().unwrap_or_default();
                axum::response::Html(padded_page(&entry(
                    "https://example.com/",
                    &format!("About {}", q),
                    "snippet text",
                )))
            }),
        );
        let provider = provider_for(app).await;

        let results = provider.search("rust & async").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "About rust & async");
        assert_eq!(results[0].snippet, "snippet text");
    }

    #[tokio::test]
    async fn error_status_is_recoverable_and_yields_nothing() {
        let app = Router::new().route(
            "/search",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, padded_page("")) }),
        );
        let provider = provider_for(app).await;

        let err = provider.search("rust").await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 503, .. }));
        assert!(err.is_recoverable());

        let search = WebSearch::new(vec![Box::new(provider)]);
        assert!(search.gather("rust").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn body_of_exactly_min_chars_is_rejected() {
        let app = Router::new()
            .route("/search", get(|| async { "x".repeat(1000) }));
        let provider = provider_for(app).await;

        let err = provider.search("rust").await.unwrap_err();
        assert!(matches!(err, SearchError::ShortBody { chars: 1000, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn body_just_over_min_chars_is_parsed() {
        let app = Router::new()
            .route("/search", get(|| async { "x".repeat(1001) }));
        let provider = provider_for(app).await;

        assert!(provider.search("rust").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_recoverable() {
        let mut config = SearchConfig::default();
        config.timeout_secs = 5;
        config.google.url_template = "http://127.0.0.1:1/search?q={query}".to_string();
        let provider = GoogleProvider::new(&config).unwrap();

        let err = provider.search("rust").await.unwrap_err();
        assert!(matches!(err, SearchError::Request { .. }));
        assert!(err.is_recoverable());
    }
}
