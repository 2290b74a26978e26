pub mod config;
pub mod document;
pub mod error;
pub mod instrumentation;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod server;

use anyhow::Result;
use std::sync::Arc;

use config::{Config, EmbeddingBackend};
use instrumentation::QueryLogger;
use llm::{Generator, OpenRouterGenerator};
use pipeline::{AskOptions, Rag};
use retrieval::{Embedder, FastEmbedder, HashEmbedder, QdrantStore};

pub use document::{Answer, Document, DocumentMetadata, RetrievedContext, ScoredDocument};
pub use error::{RagError, RagResult};

/// Wires the configured embedder, Qdrant collection, and OpenRouter client
/// into a pipeline. The generator is absent when no API key is set.
pub fn build_rag(config: &Config) -> Result<Rag> {
    let embedder: Arc<dyn Embedder> = match config.embedding_backend {
        EmbeddingBackend::FastEmbed => Arc::new(FastEmbedder::new(&config.embedding_model)?),
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.hash_embedding_dim)?),
    };

    let store = Arc::new(QdrantStore::new(
        &config.qdrant_url,
        config.qdrant_api_key.as_deref(),
        &config.collection_name,
    )?);

    let generator = OpenRouterGenerator::from_config(config)?.map(|g| Arc::new(g) as Arc<dyn Generator>);
    if generator.is_none() {
        tracing::warn!("OPENROUTER_API_KEY not set; answers are disabled, search still works");
    }

    let defaults = AskOptions {
        top_k: config.top_k,
        score_threshold: config.score_threshold,
    };

    Ok(Rag::new(embedder, store, generator, defaults).with_logger(QueryLogger::new(&config.log_dir)?))
}
