pub mod chunker;
pub mod structured;

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::document::{Document, DocumentMetadata};
pub use chunker::{Chunk, Chunker};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Loads documents from a structured `.json` knowledge base, a `.txt`/`.md`
/// file, or a directory holding any of those.
pub fn load_path(path: &Path, chunker: &Chunker) -> Result<Vec<Document>> {
    if path.is_dir() {
        let mut documents = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                documents.extend(load_file(entry.path(), chunker)?);
            }
        }
        return Ok(documents);
    }
    load_file(path, chunker)
}

fn is_supported(path: &Path) -> bool {
    match extension(path).as_deref() {
        Some("json") => true,
        Some(ext) => TEXT_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn load_file(path: &Path, chunker: &Chunker) -> Result<Vec<Document>> {
    match extension(path).as_deref() {
        Some("json") => structured::load_file(path),
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let docs = text_documents(&path.display().to_string(), &text, chunker);
            tracing::debug!(path = %path.display(), chunks = docs.len(), "text file chunked");
            Ok(docs)
        }
        _ => anyhow::bail!("Unsupported knowledge base file: {}", path.display()),
    }
}

/// Chunks `text` into documents tagged with `source` and byte offsets.
pub fn text_documents(source: &str, text: &str, chunker: &Chunker) -> Vec<Document> {
    chunker
        .chunk(text)
        .into_iter()
        .map(|chunk| {
            let key = format!("{}#{}", source, chunk.start);
            let metadata = DocumentMetadata {
                source: Some(source.to_string()),
                offset: Some(chunk.start as u64),
                word_count: Some(chunk.text.split_whitespace().count() as u64),
                ..Default::default()
            };
            Document::with_stable_id(&key, chunk.text, metadata)
        })
        .collect()
}
