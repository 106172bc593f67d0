//! Corpus loading and chunking.
//!
//! Documents are read from a directory tree (`.txt` / `.md`) and split into
//! character-bounded chunks whose byte offsets end up in provenance.

use crate::error::{RagError, Result};
use crate::rag::domain::graph::Document;
use std::path::Path;
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tracing::{debug, warn};
use walkdir::WalkDir;

const CORPUS_EXTENSIONS: &[&str] = &["txt", "md"];

/// A slice of a document passed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub document_id: &'a str,
    /// Byte offset of `text` inside the document
    pub offset: usize,
    pub text: &'a str,
}

/// Read every corpus file under `dir`, sorted by relative path.
///
/// Unreadable files are logged and skipped; a missing directory is an error.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(RagError::IndexingFailure(format!(
            "corpus directory not found: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CORPUS_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if !supported {
            continue;
        }

        let id = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => documents.push(Document::new(id, text)),
            Ok(_) => debug!(document = %id, "Skipping empty document"),
            Err(e) => warn!(document = %id, error = %e, "Failed to read corpus file"),
        }
    }

    debug!(dir = %dir.display(), count = documents.len(), "Loaded corpus");
    Ok(documents)
}

/// Split a document into chunks of at most `max_chars` characters.
pub fn chunk_document(document: &Document, max_chars: usize) -> Vec<Chunk<'_>> {
    let config = ChunkConfig::new(max_chars.max(1))
        .with_sizer(Characters)
        .with_trim(true);
    let splitter = TextSplitter::new(config);
    splitter
        .chunk_indices(&document.text)
        .map(|(offset, text)| Chunk {
            document_id: &document.id,
            offset,
            text,
        })
        .collect()
}
