//! Plain-text extraction for uploaded documents.
//!
//! Dispatch is by lower-cased file extension: PDF and DOCX are parsed, every
//! other allowed type (text, markdown, HTML) is decoded as UTF-8 with invalid
//! sequences dropped. Extraction never fails: any error is rendered into a
//! bracketed placeholder containing the word "Error", so uploads always get a
//! text value.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
enum ExtractError {
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Docx(String),
}

/// Lower-cased extension of `filename`, including the leading dot (`".pdf"`).
/// Empty when the name has no extension.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Whether `filename` has one of the `allowed` extensions (compared case-insensitively).
pub fn is_allowed(filename: &str, allowed: &[String]) -> bool {
    let ext = extension_of(filename);
    !ext.is_empty() && allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
}

/// Extracts plain text from an uploaded file's raw bytes.
pub fn extract_text(bytes: &[u8], filename: &str) -> String {
    match extension_of(filename).as_str() {
        ".pdf" => extract_pdf(bytes)
            .unwrap_or_else(|e| format!("[Error extracting text: {}]", e)),
        ".docx" => extract_docx(bytes)
            .unwrap_or_else(|e| format!("[Error extracting DOCX text: {}]", e)),
        _ => decode_lossy(bytes),
    }
}

/// UTF-8 decode that drops undecodable byte sequences instead of replacing them.
fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract gives better text but fails (or panics) on the whole
    // document at once; lopdf lets us skip individual broken pages.
    let whole = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match whole {
        Ok(Ok(pages)) => return Ok(pages.join("\n")),
        Ok(Err(e)) => tracing::debug!(error = %e, "pdf-extract failed, retrying page by page"),
        Err(_) => tracing::debug!("pdf-extract panicked, retrying page by page"),
    }

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let texts: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&page| match doc.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page, error = %e, "skipping unreadable PDF page");
                String::new()
            }
        })
        .collect();
    Ok(texts.join("\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(format!("word/document.xml: {}", e)))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(paragraphs.join("\n"))
}

/// Collects the text of every non-empty `w:p`, in document order of their
/// closing tags (text boxes nested inside a paragraph come out first).
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if let Some(current) = open.last_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => current.push('\t'),
                        b"br" | b"cr" => current.push('\n'),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                if let Some(current) = open.last_mut() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(done) = open.pop() {
                        if !done.is_empty() {
                            paragraphs.push(done);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}
