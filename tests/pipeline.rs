use async_trait::async_trait;
use std::sync::Arc;

use rag_qa::document::Usage;
use rag_qa::instrumentation::{QueryLog, QueryLogger};
use rag_qa::knowledge::{self, Chunker};
use rag_qa::llm::{Generator, LlmResponse};
use rag_qa::pipeline::{AskOptions, Rag};
use rag_qa::retrieval::{Embedder, HashEmbedder, MemoryStore, VectorStore};
use rag_qa::{Document, RagError};

/// Answers with the first source line of the prompt, like a model that
/// quotes its best evidence.
struct QuotingGenerator;

#[async_trait]
impl Generator for QuotingGenerator {
    fn model_name(&self) -> &str {
        "quoting"
    }

    async fn generate(&self, _system: &str, user_message: &str) -> anyhow::Result<LlmResponse> {
        let text = user_message
            .lines()
            .find_map(|l| l.strip_prefix("[Source 1] "))
            .unwrap_or("I could not find enough information in the knowledge base to answer this question.")
            .to_string();
        Ok(LlmResponse {
            text,
            usage: Usage {
                prompt_tokens: user_message.len() as u32 / 4,
                completion_tokens: 8,
                cost: 0.0,
            },
        })
    }
}

struct DownGenerator;

#[async_trait]
impl Generator for DownGenerator {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn generate(&self, _system: &str, _user: &str) -> anyhow::Result<LlmResponse> {
        anyhow::bail!("Failed to send request to LLM API")
    }
}

fn rag(generator: Arc<dyn Generator>) -> Rag {
    Rag::new(
        Arc::new(HashEmbedder::new(384).unwrap()),
        Arc::new(MemoryStore::new("knowledge_base")),
        Some(generator),
        AskOptions {
            top_k: 3,
            score_threshold: 0.0,
        },
    )
}

#[tokio::test]
async fn paris_is_found_and_answered() {
    let rag = rag(Arc::new(QuotingGenerator));
    let stored = rag
        .ingest(&[
            Document::new("Paris is the capital of France."),
            Document::new("The Amazon rainforest absorbs large amounts of carbon."),
            Document::new("Sea levels rise as glaciers melt."),
        ])
        .await
        .unwrap();
    assert_eq!(stored, 3);

    let answer = rag.answer("What is the capital of France?").await.unwrap();

    assert!(answer
        .context
        .iter()
        .any(|hit| hit.document.content == "Paris is the capital of France."));
    assert!(answer.text.contains("Paris"));
    assert!(answer.context.len() <= 3);
    assert!(answer.context.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn empty_knowledge_base_still_answers_from_question() {
    let rag = rag(Arc::new(QuotingGenerator));
    let answer = rag.answer("What is the capital of France?").await.unwrap();
    assert!(answer.context.is_empty());
    assert!(answer.text.contains("could not find"));
}

#[tokio::test]
async fn failed_generation_leaves_no_answer_or_log() {
    let dir = tempfile::tempdir().unwrap();
    let logger = QueryLogger::new(dir.path()).unwrap();
    let rag = rag(Arc::new(DownGenerator)).with_logger(logger.clone());
    rag.ingest(&[Document::new("Paris is the capital of France.")])
        .await
        .unwrap();

    let err = rag.answer("What is the capital of France?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert!(!logger.path().exists());
}

#[tokio::test]
async fn answered_questions_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    let logger = QueryLogger::new(dir.path()).unwrap();
    let rag = rag(Arc::new(QuotingGenerator)).with_logger(logger.clone());
    rag.ingest(&[Document::new("Paris is the capital of France.")])
        .await
        .unwrap();

    rag.answer("What is the capital of France?").await.unwrap();

    let contents = std::fs::read_to_string(logger.path()).unwrap();
    let log: QueryLog = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(log.question, "What is the capital of France?");
    assert_eq!(log.num_results, 1);
    assert_eq!(log.top_k, 3);
}

#[tokio::test]
async fn structured_knowledge_base_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("climate.json");
    std::fs::write(
        &path,
        r#"{"document": {"title": "Climate", "chapters": [
            {"chapter_number": 2, "chapter_title": "Causes", "sections": [
                {"section_title": "Agriculture", "section_type": "subsection",
                 "content": "Livestock farming releases methane, a potent greenhouse gas.",
                 "metadata": {"word_count": 9, "key_terms": ["methane"]}},
                {"section_type": "subsection",
                 "content": "Deforestation removes trees that store carbon dioxide.",
                 "metadata": {"word_count": 8, "key_terms": ["deforestation"]}}
            ]}
        ]}}"#,
    )
    .unwrap();

    let documents = knowledge::load_path(&path, &Chunker::default()).unwrap();
    let rag = rag(Arc::new(QuotingGenerator));
    rag.ingest(&documents).await.unwrap();
    // re-ingesting the same file overwrites rather than duplicates
    rag.ingest(&documents).await.unwrap();
    assert_eq!(rag.stats().await.unwrap().points_count, 2);

    let hits = rag
        .search(
            "methane from livestock",
            &AskOptions {
                top_k: 1,
                score_threshold: 0.0,
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.metadata.section_title.as_deref(), Some("Agriculture"));
    assert_eq!(hits[0].document.metadata.chapter_number.as_deref(), Some("2"));
}

#[tokio::test]
async fn embedding_is_deterministic_across_instances() {
    let a = HashEmbedder::new(384).unwrap();
    let b = HashEmbedder::new(384).unwrap();
    let text = "Greenhouse gases trap heat.";
    assert_eq!(a.embed_one(text).unwrap(), b.embed_one(text).unwrap());
}

#[tokio::test]
async fn store_rejects_vectors_of_wrong_width() {
    let store = MemoryStore::new("kb");
    store.ensure_collection(384).await.unwrap();
    let err = store
        .upsert(&[Document::new("short")], vec![vec![0.5; 10]])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dimension"));
}
