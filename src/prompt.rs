//! Prompt assembly for a chat turn.
//!
//! The prompt is built from up to four blank-line-separated parts, always in
//! this order:
//!
//! ```text
//! <system instruction with today's date>
//!
//! Uploaded context files:            (only when documents are stored)
//! File: notes.txt
//! <first N chars of notes.txt>
//!
//! Web search results:                (only when search was requested)
//! 1. [Title](https://…)
//! Source: Google
//! Summary: …
//!
//! User question: <message>
//! ```

use chrono::NaiveDate;

use crate::models::{ContextRecord, SearchResult};
use crate::search::SearchError;

/// `%A, %d %B %Y`, e.g. `Monday, 19 October 2026`.
pub fn format_today(date: NaiveDate) -> String {
    date.format("%A, %d %B %Y").to_string()
}

pub fn system_instruction(today: &str) -> String {
    format!(
        "You are a helpful AI assistant. Today is {}. \
         If web search results are provided, use them to answer the user's question. \
         Cite the source if you use information from the search results. \
         If no relevant results are found, answer based on your own knowledge.",
        today
    )
}

/// First `max_chars` characters of `text`.
fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Renders stored documents, each cut to `max_chars`. `None` when there are none.
pub fn rag_block(records: &[ContextRecord], max_chars: usize) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let mut block = String::from("Uploaded context files:\n\n");
    for record in records {
        block.push_str(&format!(
            "File: {}\n{}\n\n",
            record.filename,
            char_prefix(&record.content, max_chars)
        ));
    }
    Some(block)
}

/// Renders the outcome of a web search, including the empty and failed cases.
pub fn search_block(outcome: &Result<Vec<SearchResult>, SearchError>) -> String {
    match outcome {
        Ok(results) if results.is_empty() => "No relevant web search results found.\n\n".to_string(),
        Ok(results) => {
            let mut block = String::from("Web search results:\n\n");
            for (idx, result) in results.iter().enumerate() {
                block.push_str(&format!(
                    "{}. [{}]({})\nSource: {}\nSummary: {}\n\n",
                    idx + 1,
                    result.title,
                    result.url,
                    result.source,
                    result.snippet
                ));
            }
            block
        }
        Err(e) => format!("Error during web search: {}\n\n", e),
    }
}

/// Joins the parts of a prompt; the user question always comes last.
pub fn assemble(
    instruction: &str,
    rag: Option<&str>,
    search: Option<&str>,
    user_message: &str,
) -> String {
    let question = format!("User question: {}", user_message);
    let mut parts: Vec<&str> = vec![instruction];
    parts.extend(rag.filter(|s| !s.is_empty()));
    parts.extend(search.filter(|s| !s.is_empty()));
    parts.push(&question);
    parts.join("\n\n")
}
