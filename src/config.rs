use anyhow::{Context, Result};
use std::str::FromStr;

/// Which embedder backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    FastEmbed,
    Hash,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "hash" => Ok(Self::Hash),
            other => anyhow::bail!("Unknown embedding backend: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_timeout_secs: u64,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub hash_embedding_dim: usize,
    pub top_k: u64,
    pub score_threshold: f32,
    pub log_dir: String,
    pub service_host: String,
    pub service_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_base_url: "https://openrouter.ai/api/v1".into(),
            llm_model: "openai/gpt-3.5-turbo".into(),
            llm_max_tokens: 500,
            llm_temperature: 0.3,
            llm_timeout_secs: 30,
            qdrant_url: "http://localhost:6334".into(),
            qdrant_api_key: None,
            collection_name: "knowledge_base".into(),
            embedding_backend: EmbeddingBackend::FastEmbed,
            embedding_model: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".into(),
            hash_embedding_dim: 384,
            top_k: 5,
            score_threshold: 0.0,
            log_dir: "logs".into(),
            service_host: "127.0.0.1".into(),
            service_port: 8000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            llm_api_key: get("OPENROUTER_API_KEY"),
            llm_base_url: get("OPENROUTER_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: get("OPENROUTER_MODEL").unwrap_or(defaults.llm_model),
            llm_max_tokens: parse_or(get("LLM_MAX_TOKENS"), defaults.llm_max_tokens)
                .context("LLM_MAX_TOKENS must be a number")?,
            llm_temperature: parse_or(get("LLM_TEMPERATURE"), defaults.llm_temperature)
                .context("LLM_TEMPERATURE must be a number")?,
            llm_timeout_secs: parse_or(get("LLM_TIMEOUT_SECS"), defaults.llm_timeout_secs)
                .context("LLM_TIMEOUT_SECS must be a number")?,
            qdrant_url: get("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            qdrant_api_key: get("QDRANT_API_KEY"),
            collection_name: get("COLLECTION_NAME").unwrap_or(defaults.collection_name),
            embedding_backend: match get("EMBEDDING_BACKEND") {
                Some(v) => v.parse().context("EMBEDDING_BACKEND must be fastembed or hash")?,
                None => defaults.embedding_backend,
            },
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            hash_embedding_dim: parse_or(get("HASH_EMBEDDING_DIM"), defaults.hash_embedding_dim)
                .context("HASH_EMBEDDING_DIM must be a number")?,
            top_k: parse_or(get("TOP_K"), defaults.top_k).context("TOP_K must be a number")?,
            score_threshold: parse_or(get("SCORE_THRESHOLD"), defaults.score_threshold)
                .context("SCORE_THRESHOLD must be a number")?,
            log_dir: get("LOG_DIR").unwrap_or(defaults.log_dir),
            service_host: get("SERVICE_HOST").unwrap_or(defaults.service_host),
            service_port: parse_or(get("SERVICE_PORT"), defaults.service_port)
                .context("SERVICE_PORT must be a port number")?,
        })
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse()?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.llm_api_key.is_none());
        assert_eq!(config.top_k, 5);
        assert_eq!(config.qdrant_url, "http://localhost:6334");
        assert_eq!(config.llm_base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.embedding_backend, EmbeddingBackend::FastEmbed);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("TOP_K", "3"),
            ("EMBEDDING_BACKEND", "Hash"),
            ("SCORE_THRESHOLD", "0.25"),
            ("COLLECTION_NAME", "climate_docs"),
        ]))
        .unwrap();
        assert_eq!(config.llm_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hash);
        assert!((config.score_threshold - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.collection_name, "climate_docs");
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let config = Config::from_lookup(lookup(&[("OPENROUTER_API_KEY", "  ")])).unwrap();
        assert!(config.llm_api_key.is_none());
    }

    #[test]
    fn bad_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[("TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("TOP_K"));
    }
}
