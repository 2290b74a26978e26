//! HTTP front-end for the pipeline.
//!
//! - `GET  /health`           service and dependency status
//! - `POST /query`            retrieval plus generated answer
//! - `POST /search`           retrieval only
//! - `GET  /collection/info`  vector collection statistics
//! - `GET  /config`           active configuration, secrets omitted

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::document::{DocumentMetadata, ScoredDocument};
use crate::error::RagError;
use crate::pipeline::{AskOptions, Rag};
use crate::retrieval::CollectionStats;

const MAX_LIMIT: u64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<Rag>,
    pub config: Arc<ConfigResponse>,
}

impl AppState {
    pub fn new(rag: Arc<Rag>, config: &Config) -> Self {
        let config = ConfigResponse {
            qdrant_url: config.qdrant_url.clone(),
            collection_name: config.collection_name.clone(),
            embedding_model: rag.embedder().model_name().to_string(),
            openrouter_available: rag.generator_available(),
            openrouter_model: if rag.generator_available() {
                config.llm_model.clone()
            } else {
                "not configured".to_string()
            },
            top_k: config.top_k,
        };
        Self {
            rag,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default = "default_use_llm")]
    pub use_llm: bool,
    #[serde(default = "default_query_threshold")]
    pub score_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub question: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub score_threshold: f32,
}

fn default_limit() -> u64 {
    5
}

fn default_use_llm() -> bool {
    true
}

fn default_query_threshold() -> f32 {
    0.3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f32,
    pub content: String,
    pub title: String,
    pub metadata: DocumentMetadata,
}

impl From<ScoredDocument> for SearchResult {
    fn from(hit: ScoredDocument) -> Self {
        Self {
            score: hit.score,
            title: hit.document.label(),
            content: hit.document.content,
            metadata: hit.document.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: Option<String>,
    pub search_results: Vec<SearchResult>,
    pub top_result: Option<SearchResult>,
    pub processing_time: f64,
    pub total_results: usize,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub qdrant_connected: bool,
    pub embedding_model_loaded: bool,
    pub openrouter_available: bool,
    pub collection_info: Option<CollectionStats>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub openrouter_available: bool,
    pub openrouter_model: String,
    pub top_k: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: message.into(),
                code: "INVALID_REQUEST".to_string(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.body.code
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let code = match err {
            RagError::Embedding(_) => "EMBEDDING_FAILED",
            RagError::Retrieval(_) => "RETRIEVAL_FAILED",
            RagError::Generation(_) => "GENERATION_FAILED",
        };
        tracing::error!(stage = err.stage(), error = %err, "request failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: ErrorResponse {
                error: err.to_string(),
                code: code.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(query))
        .route("/search", post(search))
        .route("/collection/info", get(collection_info))
        .route("/config", get(config))
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "HTTP service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let collection_info = match state.rag.stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "vector store health check failed");
            None
        }
    };
    let qdrant_connected = collection_info.is_some();

    Json(HealthResponse {
        status: if qdrant_connected { "healthy" } else { "unhealthy" }.to_string(),
        qdrant_connected,
        embedding_model_loaded: true,
        openrouter_available: state.rag.generator_available(),
        collection_info,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let start = Instant::now();
    let Json(request) = payload?;
    let options = validate(&request.question, request.limit, request.score_threshold)?;

    let (answer, hits) = if request.use_llm && state.rag.generator_available() {
        let answer = state.rag.answer_with(&request.question, &options).await?;
        (Some(answer.text), answer.context)
    } else {
        (None, state.rag.search(&request.question, &options).await?)
    };

    let search_results: Vec<SearchResult> = hits.into_iter().map(SearchResult::from).collect();
    let processing_time = (start.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    tracing::info!(results = search_results.len(), processing_time, "query processed");

    Ok(Json(QueryResponse {
        question: request.question,
        answer,
        top_result: search_results.first().cloned(),
        total_results: search_results.len(),
        search_results,
        processing_time,
        status: "success".to_string(),
    }))
}

pub async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let Json(request) = payload?;
    let options = validate(&request.question, request.limit, request.score_threshold)?;
    let hits = state.rag.search(&request.question, &options).await?;
    Ok(Json(hits.into_iter().map(SearchResult::from).collect()))
}

pub async fn collection_info(State(state): State<AppState>) -> Result<Json<CollectionStats>, ApiError> {
    Ok(Json(state.rag.stats().await?))
}

pub async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(state.config.as_ref().clone())
}

fn validate(question: &str, limit: u64, score_threshold: f32) -> Result<AskOptions, ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::invalid("question must not be empty"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::invalid(format!("limit must be between 1 and {}", MAX_LIMIT)));
    }
    if !(0.0..=1.0).contains(&score_threshold) {
        return Err(ApiError::invalid("score_threshold must be between 0 and 1"));
    }
    Ok(AskOptions {
        top_k: limit,
        score_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::retrieval::{HashEmbedder, MemoryStore};

    async fn state() -> AppState {
        let rag = Rag::new(
            Arc::new(HashEmbedder::new(128).unwrap()),
            Arc::new(MemoryStore::new("kb")),
            None,
            AskOptions::default(),
        );
        rag.ingest(&[
            Document::new("Paris is the capital of France."),
            Document::new("Methane emissions come from livestock."),
        ])
        .await
        .unwrap();
        AppState::new(Arc::new(rag), &Config::default())
    }

    #[tokio::test]
    async fn query_without_llm_returns_results_only() {
        let request = QueryRequest {
            question: "What is the capital of France?".into(),
            limit: 5,
            use_llm: true,
            score_threshold: 0.3,
        };
        let Json(response) = query(State(state().await), Ok(Json(request))).await.unwrap();
        assert!(response.answer.is_none());
        assert_eq!(response.status, "success");
        assert_eq!(response.total_results, response.search_results.len());
        assert_eq!(
            response.top_result.unwrap().content,
            "Paris is the capital of France."
        );
    }

    #[tokio::test]
    async fn search_rejects_out_of_range_limit() {
        let request = SearchRequest {
            question: "capital".into(),
            limit: 50,
            score_threshold: 0.0,
        };
        let err = search(State(state().await), Ok(Json(request))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let request = SearchRequest {
            question: " ".into(),
            limit: 5,
            score_threshold: 0.0,
        };
        assert!(search(State(state().await), Ok(Json(request))).await.is_err());
    }

    #[tokio::test]
    async fn query_limit_is_capped_like_search() {
        let request = QueryRequest {
            question: "capital".into(),
            limit: 1000,
            use_llm: false,
            score_threshold: 0.3,
        };
        let err = query(State(state().await), Ok(Json(request))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn malformed_body_is_an_invalid_request() {
        let body = Json::<QueryRequest>::from_bytes(br#"{"limit": 3}"#);
        assert!(body.is_err());
        let err = query(State(state().await), body).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_REQUEST");

        let body = Json::<SearchRequest>::from_bytes(br#"{"question": 7}"#);
        let err = search(State(state().await), body).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_store_and_llm() {
        let Json(health) = health_check(State(state().await)).await;
        assert_eq!(health.status, "healthy");
        assert!(!health.openrouter_available);
        assert_eq!(health.collection_info.unwrap().points_count, 2);
    }

    #[tokio::test]
    async fn config_hides_model_without_key() {
        let Json(cfg) = config(State(state().await)).await;
        assert!(!cfg.openrouter_available);
        assert_eq!(cfg.openrouter_model, "not configured");
    }

    #[test]
    fn rag_errors_map_to_bad_gateway() {
        let err = ApiError::from(RagError::Generation(anyhow::anyhow!("boom")));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "GENERATION_FAILED");
    }

    #[test]
    fn request_defaults_follow_api_contract() {
        let request: QueryRequest = serde_json::from_str(r#"{"question": "q"}"#).unwrap();
        assert_eq!(request.limit, 5);
        assert!(request.use_llm);
        assert!((request.score_threshold - 0.3).abs() < f32::EPSILON);
    }
}
