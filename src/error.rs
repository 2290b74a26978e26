use thiserror::Error;

/// Failure of a single pipeline call, tagged with the stage that failed.
///
/// Every variant is terminal for the call that produced it; nothing partial
/// is returned alongside.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding model could not produce a usable vector.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// The vector store was unreachable or rejected the request.
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    /// The chat-completion call failed (network, rate limit, bad key, ...).
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl RagError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Embedding(_) => "embedding",
            Self::Retrieval(_) => "retrieval",
            Self::Generation(_) => "generation",
        }
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;
