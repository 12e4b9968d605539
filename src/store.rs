//! In-memory store of uploaded documents, plus the on-disk side of uploads.
//!
//! Records are kept in insertion order. Filenames are not deduplicated: a
//! second upload of `notes.txt` overwrites the file on disk and appends a new
//! record, and deleting `notes.txt` removes every record with that name.

use std::io;
use std::path::{Path, PathBuf};

use crate::models::{ContextRecord, ContextSummary};

/// Result of [`ContextStore::remove`].
#[derive(Debug, Default)]
pub struct RemoveOutcome {
    /// Number of records dropped from the store.
    pub removed: usize,
    /// Backing files that could not be deleted. The records are gone regardless.
    pub file_errors: Vec<(PathBuf, io::Error)>,
}

impl RemoveOutcome {
    pub fn any_removed(&self) -> bool {
        self.removed > 0
    }
}

#[derive(Debug, Default)]
pub struct ContextStore {
    records: Vec<ContextRecord>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: ContextRecord) {
        self.records.push(record);
    }

    pub fn list(&self) -> Vec<ContextSummary> {
        self.records.iter().map(ContextSummary::from).collect()
    }

    pub fn records(&self) -> &[ContextRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes every record named `filename` and deletes its backing file.
    ///
    /// A file that cannot be deleted is logged and reported in
    /// [`RemoveOutcome::file_errors`]; its record is removed anyway.
    pub fn remove(&mut self, filename: &str) -> RemoveOutcome {
        let mut outcome = RemoveOutcome::default();
        let (matching, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.filename == filename);
        self.records = remaining;

        for record in matching {
            outcome.removed += 1;
            if let Err(e) = std::fs::remove_file(&record.storage_path) {
                tracing::warn!(
                    path = %record.storage_path.display(),
                    error = %e,
                    "could not delete context file"
                );
                outcome.file_errors.push((record.storage_path, e));
            }
        }
        outcome
    }
}

/// Reduces an uploaded filename to a safe, flat name.
///
/// Path separators become spaces, anything outside ASCII alphanumerics and
/// `._-` is dropped, whitespace runs become `_`, and leading/trailing `.`/`_`
/// are trimmed. May return an empty string (e.g. for `"../"`).
pub fn sanitize_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Writes an upload's raw bytes to `dir/filename`, creating `dir` if needed.
pub fn save_upload(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, bytes)?;
    Ok(path)
}
