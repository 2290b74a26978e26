pub mod prompt;

use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

use crate::document::{Answer, Document, RetrievedContext, StageTimings};
use crate::error::{RagError, RagResult};
use crate::instrumentation::{QueryLog, QueryLogger};
use crate::llm::Generator;
use crate::retrieval::{CollectionStats, Embedder, VectorStore};

const INGEST_BATCH: usize = 64;

/// Retrieval knobs for a single call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AskOptions {
    pub top_k: u64,
    /// Hits scoring below this are dropped; 0 or less disables the filter.
    pub score_threshold: f32,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.0,
        }
    }
}

/// Question answering over a vector store: embed, retrieve, prompt, generate.
pub struct Rag {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Option<Arc<dyn Generator>>,
    defaults: AskOptions,
    logger: Option<QueryLogger>,
}

impl Rag {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Option<Arc<dyn Generator>>,
        defaults: AskOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            defaults,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: QueryLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn defaults(&self) -> AskOptions {
        self.defaults
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn generator_available(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn answer(&self, question: &str) -> RagResult<Answer> {
        self.answer_with(question, &self.defaults).await
    }

    #[tracing::instrument(skip(self, options), fields(top_k = options.top_k))]
    pub async fn answer_with(&self, question: &str, options: &AskOptions) -> RagResult<Answer> {
        let run_start = Instant::now();

        let embed_start = Instant::now();
        let query_vector = self.embed_question(question)?;
        let embed_ms = embed_start.elapsed().as_millis() as u64;

        let search_start = Instant::now();
        let context = self.retrieve(&query_vector, options).await?;
        let search_ms = search_start.elapsed().as_millis() as u64;

        let generator = self.generator.as_ref().ok_or_else(|| {
            RagError::Generation(anyhow::anyhow!("No LLM configured (set OPENROUTER_API_KEY)"))
        })?;

        let user_message = prompt::build_user_message(question, &context);
        let generation_start = Instant::now();
        let response = generator
            .generate(prompt::SYSTEM_PROMPT, &user_message)
            .await
            .map_err(RagError::Generation)?;
        let generation_ms = generation_start.elapsed().as_millis() as u64;

        let answer = Answer {
            question: question.to_string(),
            text: response.text,
            context,
            usage: response.usage,
            timings: StageTimings {
                embed_ms,
                search_ms,
                generation_ms,
                total_ms: run_start.elapsed().as_millis() as u64,
            },
        };

        tracing::info!(
            results = answer.context.len(),
            total_ms = answer.timings.total_ms,
            tokens = answer.usage.total_tokens(),
            "question answered"
        );

        if let Some(logger) = &self.logger {
            if let Err(e) = logger.write(&QueryLog::from_answer(&answer, options.top_k)) {
                tracing::warn!(error = %e, "failed to write query log");
            }
        }

        Ok(answer)
    }

    /// Retrieval only, no generation.
    pub async fn search(&self, question: &str, options: &AskOptions) -> RagResult<RetrievedContext> {
        let query_vector = self.embed_question(question)?;
        self.retrieve(&query_vector, options).await
    }

    /// Embeds and stores `documents`, creating the collection on first use.
    pub async fn ingest(&self, documents: &[Document]) -> RagResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        self.store
            .ensure_collection(self.embedder.dimension())
            .await
            .map_err(RagError::Retrieval)?;

        let mut stored = 0;
        for batch in documents.chunks(INGEST_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .context("Failed to embed documents")
                .map_err(RagError::Embedding)?;
            stored += self
                .store
                .upsert(batch, vectors)
                .await
                .map_err(RagError::Retrieval)?;
            tracing::debug!(stored, total = documents.len(), "ingest progress");
        }

        tracing::info!(stored, model = self.embedder.model_name(), "documents ingested");
        Ok(stored)
    }

    pub async fn stats(&self) -> RagResult<CollectionStats> {
        self.store.stats().await.map_err(RagError::Retrieval)
    }

    fn embed_question(&self, question: &str) -> RagResult<Vec<f32>> {
        if question.trim().is_empty() {
            return Err(RagError::Embedding(anyhow::anyhow!("Question is empty")));
        }
        let vector = self
            .embedder
            .embed_one(question)
            .context("Failed to embed question")
            .map_err(RagError::Embedding)?;
        if vector.len() != self.embedder.dimension() {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "Embedder returned {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimension()
            )));
        }
        Ok(vector)
    }

    async fn retrieve(&self, query_vector: &[f32], options: &AskOptions) -> RagResult<RetrievedContext> {
        if options.top_k == 0 {
            return Ok(Vec::new());
        }
        let threshold = (options.score_threshold > 0.0).then_some(options.score_threshold);

        let mut hits = self
            .store
            .search(query_vector, options.top_k, threshold)
            .await
            .map_err(RagError::Retrieval)?;

        // Stores are expected to rank already; enforce it regardless of backend.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(options.top_k as usize);
        if let Some(t) = threshold {
            hits.retain(|h| h.score >= t);
        }
        Ok(hits)
    }
}
