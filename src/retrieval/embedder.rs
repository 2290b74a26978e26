use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .context("Embedder returned no vector")
    }
}

/// Local sentence-transformer models run through fastembed.
pub struct FastEmbedder {
    model_name: String,
    dimension: usize,
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        let model_type = match model_name {
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
            | "paraphrase-multilingual-MiniLM-L12-v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
            "mixedbread-ai/mxbai-embed-large-v1" => EmbeddingModel::MxbaiEmbedLargeV1,
            "nomic-ai/nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            _ => anyhow::bail!("Unsupported embedding model: {}", model_name),
        };

        let model = TextEmbedding::try_new(InitOptions::new(model_type).with_show_download_progress(true))
            .context("Failed to initialize embedding model")?;

        // fastembed doesn't expose the width uniformly across versions; probe it.
        let probe = model
            .embed(vec!["dimension probe"], None)
            .context("Failed to probe embedding dimension")?;
        let dimension = probe.first().map(Vec::len).context("Embedding probe returned nothing")?;

        tracing::info!(model = model_name, dimension, "embedding model loaded");

        Ok(Self {
            model_name: model_name.to_string(),
            dimension,
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("Cannot embed empty text");
        }
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let embeddings = self
            .model
            .lock()
            .embed(texts, None)
            .context("Failed to generate embeddings")?;

        if let Some(bad) = embeddings.iter().find(|v| v.len() != self.dimension) {
            anyhow::bail!(
                "Unexpected embedding dimension (expected {}, got {})",
                self.dimension,
                bad.len()
            );
        }
        Ok(embeddings)
    }
}

/// Deterministic hashed bag-of-words embedder. Needs no model download, so
/// it backs offline runs and tests. Vectors are L2-normalised.
pub struct HashEmbedder {
    model_name: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than zero");
        }
        Ok(Self {
            model_name: format!("hash-bow-{}", dimension),
            dimension,
        })
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        (hasher.finish() % self.dimension as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokens(text) {
            vector[self.bucket(&token)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                if Self::tokens(text).next().is_none() {
                    anyhow::bail!("Cannot embed text without any words");
                }
                Ok(self.embed_text(text))
            })
            .collect()
    }
}
