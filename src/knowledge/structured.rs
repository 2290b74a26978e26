//! Structured knowledge-base JSON: one document split into chapters and sections.
//!
//! ```json
//! {"document": {"title": "...", "chapters": [
//!     {"chapter_number": 1, "chapter_title": "...", "sections": [
//!         {"section_title": "...", "section_type": "subsection", "content": "...",
//!          "metadata": {"word_count": 120, "key_terms": ["..."]}}]}]}}
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::document::{Document, DocumentMetadata};

const MAIN_CONTENT: &str = "main_content";

#[derive(Debug, Deserialize)]
struct KnowledgeBase {
    document: SourceDocument,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    title: String,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
struct Chapter {
    chapter_number: serde_json::Value,
    chapter_title: String,
    #[serde(default)]
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    section_title: Option<String>,
    #[serde(default)]
    section_type: String,
    content: String,
    #[serde(default)]
    metadata: SectionMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct SectionMetadata {
    word_count: Option<u64>,
    #[serde(default)]
    key_terms: Vec<String>,
}

pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read knowledge base: {}", path.display()))?;
    let docs = parse(&raw).with_context(|| format!("Invalid knowledge base: {}", path.display()))?;
    tracing::info!(path = %path.display(), sections = docs.len(), "structured knowledge base loaded");
    Ok(docs)
}

pub fn parse(raw: &str) -> Result<Vec<Document>> {
    let kb: KnowledgeBase = serde_json::from_str(raw).context("Failed to parse knowledge base JSON")?;
    let title = kb.document.title;

    let mut documents = Vec::new();
    for chapter in kb.document.chapters {
        let chapter_number = match &chapter.chapter_number {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        for (index, section) in chapter.sections.into_iter().enumerate() {
            if section.content.trim().is_empty() {
                continue;
            }
            let section_title = section_title(&section, &chapter.chapter_title);
            let word_count = section
                .metadata
                .word_count
                .unwrap_or_else(|| section.content.split_whitespace().count() as u64);

            let metadata = DocumentMetadata {
                source: Some(title.clone()),
                document_title: Some(title.clone()),
                chapter_number: Some(chapter_number.clone()),
                chapter_title: Some(chapter.chapter_title.clone()),
                section_title: Some(section_title),
                section_type: Some(section.section_type.clone()),
                word_count: Some(word_count),
                key_terms: section.metadata.key_terms,
                offset: Some(index as u64),
            };
            let key = format!("{}/{}/{}", title, chapter_number, index);
            documents.push(Document::with_stable_id(&key, section.content, metadata));
        }
    }

    Ok(documents)
}

/// Untitled main content is named after its chapter; other untitled
/// sections take their first four words.
fn section_title(section: &Section, chapter_title: &str) -> String {
    match section.section_title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ if section.section_type == MAIN_CONTENT => format!("Introduction - {}", chapter_title),
        _ => {
            let first_words = section
                .content
                .split_whitespace()
                .take(4)
                .collect::<Vec<_>>()
                .join(" ");
            format!("{}...", first_words)
        }
    }
}
