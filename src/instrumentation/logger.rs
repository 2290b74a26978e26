use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::document::Answer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: String,
    pub timestamp: String,
    pub question: String,
    pub top_k: u64,
    pub num_results: u32,
    pub top_score: Option<f32>,
    pub sources: Vec<String>,
    pub embed_latency_ms: u64,
    pub search_latency_ms: u64,
    pub generation_latency_ms: u64,
    pub total_latency_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
    pub answer: String,
}

impl QueryLog {
    pub fn from_answer(answer: &Answer, top_k: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            question: answer.question.clone(),
            top_k,
            num_results: answer.context.len() as u32,
            top_score: answer.context.first().map(|h| h.score),
            sources: answer.context.iter().map(|h| h.document.label()).collect(),
            embed_latency_ms: answer.timings.embed_ms,
            search_latency_ms: answer.timings.search_ms,
            generation_latency_ms: answer.timings.generation_ms,
            total_latency_ms: answer.timings.total_ms,
            prompt_tokens: answer.usage.prompt_tokens,
            completion_tokens: answer.usage.completion_tokens,
            cost: answer.usage.cost,
            answer: answer.text.clone(),
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn summary(&self) -> String {
        format!(
            "Results: {} | Top score: {} | Latency: {:.1}s (embed {}ms, search {}ms, llm {}ms) | Tokens: {} | Cost: ${:.4}",
            self.num_results,
            self.top_score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "-".into()),
            self.total_latency_ms as f64 / 1000.0,
            self.embed_latency_ms,
            self.search_latency_ms,
            self.generation_latency_ms,
            self.total_tokens(),
            self.cost,
        )
    }
}

/// Appends one JSON line per answered question to `<dir>/queries.jsonl`.
#[derive(Debug, Clone)]
pub struct QueryLogger {
    dir: PathBuf,
}

impl QueryLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create logs directory")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("queries.jsonl")
    }

    pub fn write(&self, log: &QueryLog) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .context("Failed to open log file")?;

        let json = serde_json::to_string(log).context("Failed to serialize query log")?;
        writeln!(file, "{}", json).context("Failed to write log")?;

        Ok(())
    }
}
