use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use qdrant_client::qdrant::{
    vectors_config, CollectionStatus, CreateCollectionBuilder, Distance, PointStruct, SearchPoints,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use uuid::Uuid;

use crate::document::{Document, DocumentMetadata, ScoredDocument};
use crate::retrieval::store::{CollectionStats, VectorStore};

const UPSERT_BATCH: usize = 256;

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: RwLock<Option<usize>>,
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<&str>, collection: &str) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().context("Failed to connect to Qdrant")?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension: RwLock::new(None),
        })
    }

    async fn collection_dimension(&self) -> Result<Option<usize>> {
        let cached = *self.dimension.read();
        if cached.is_some() {
            return Ok(cached);
        }
        if !self
            .client
            .collection_exists(&self.collection)
            .await
            .context("Failed to check Qdrant collection")?
        {
            return Ok(None);
        }
        let stats = self.stats().await?;
        if let Some(dim) = stats.dimension {
            *self.dimension.write() = Some(dim);
        }
        Ok(stats.dimension)
    }

    async fn flush(&self, points: Vec<PointStruct>) -> Result<()> {
        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .context("Qdrant upsert failed")?;
        tracing::debug!(collection = %self.collection, count, "points upserted");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        match self.collection_dimension().await? {
            Some(existing) if existing != dimension => anyhow::bail!(
                "Collection {} already exists with dimension {}, requested {}",
                self.collection,
                existing,
                dimension
            ),
            Some(_) => {
                tracing::debug!(collection = %self.collection, "collection already exists");
            }
            None => {
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&self.collection)
                            .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
                    )
                    .await
                    .context("Failed to create Qdrant collection")?;
                tracing::info!(collection = %self.collection, dimension, "collection created");
            }
        }
        *self.dimension.write() = Some(dimension);
        Ok(())
    }

    async fn upsert(&self, documents: &[Document], vectors: Vec<Vec<f32>>) -> Result<usize> {
        if documents.len() != vectors.len() {
            anyhow::bail!("Got {} documents but {} vectors", documents.len(), vectors.len());
        }
        let expected = self
            .collection_dimension()
            .await?
            .with_context(|| format!("Collection {} does not exist", self.collection))?;

        let uploaded_at = chrono::Utc::now().to_rfc3339();
        let mut points = Vec::with_capacity(documents.len());
        for (i, (doc, vector)) in documents.iter().zip(vectors).enumerate() {
            if vector.len() != expected {
                anyhow::bail!(
                    "Vector dimension mismatch: collection {} expects {}, vector {} has {}",
                    self.collection,
                    expected,
                    i,
                    vector.len()
                );
            }
            points.push(PointStruct::new(
                doc.id.to_string(),
                vector,
                document_payload(doc, &uploaded_at)?,
            ));
        }

        let total = points.len();
        let mut batch = Vec::with_capacity(UPSERT_BATCH);
        for point in points {
            batch.push(point);
            if batch.len() == UPSERT_BATCH {
                self.flush(std::mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(batch).await?;
        }

        Ok(total)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>> {
        let existing = self.collection_dimension().await?;
        if !should_query(&self.collection, existing, query_vector.len())? {
            tracing::debug!(collection = %self.collection, "collection missing, nothing to search");
            return Ok(Vec::new());
        }

        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query_vector.to_vec(),
            limit: top_k,
            score_threshold,
            with_payload: Some(true.into()),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(search_request)
            .await
            .context("Qdrant search failed")?;

        let hits = results
            .result
            .into_iter()
            .map(|point| ScoredDocument {
                document: document_from_payload(&point.payload),
                score: point.score,
            })
            .collect();

        Ok(hits)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .context("Failed to fetch Qdrant collection info")?
            .result
            .context("Qdrant returned no collection info")?;

        let dimension = info
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                _ => None,
            });

        let status = CollectionStatus::try_from(info.status)
            .map(|s| s.as_str_name().to_lowercase())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(CollectionStats {
            name: self.collection.clone(),
            points_count: info.points_count.unwrap_or(0),
            status,
            dimension,
        })
    }
}

/// Whether a search should reach Qdrant: a collection that was never
/// created has nothing to match.
fn should_query(collection: &str, existing: Option<usize>, query_len: usize) -> Result<bool> {
    match existing {
        None => Ok(false),
        Some(dim) if dim != query_len => anyhow::bail!(
            "Vector dimension mismatch: collection {} expects {}, got {}",
            collection,
            dim,
            query_len
        ),
        Some(_) => Ok(true),
    }
}

fn document_payload(doc: &Document, uploaded_at: &str) -> Result<Payload> {
    Payload::try_from(payload_json(doc, uploaded_at)?).context("Failed to build Qdrant payload")
}

fn payload_json(doc: &Document, uploaded_at: &str) -> Result<serde_json::Value> {
    let mut json = serde_json::to_value(&doc.metadata).context("Failed to serialize metadata")?;
    if let Some(map) = json.as_object_mut() {
        map.insert("doc_id".into(), doc.id.to_string().into());
        map.insert("content".into(), doc.content.clone().into());
        map.insert("uploaded_at".into(), uploaded_at.into());
    }
    Ok(json)
}

fn document_from_payload(payload: &HashMap<String, Value>) -> Document {
    let text = |key: &str| payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string());
    let number = |key: &str| payload.get(key).and_then(|v| v.as_integer()).map(|n| n as u64);

    let key_terms = payload
        .get("key_terms")
        .and_then(|v| v.as_list())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Document {
        id: text("doc_id")
            .and_then(|s| Uuid::parse_str(&s).ok())
            .unwrap_or_else(Uuid::nil),
        content: text("content").unwrap_or_default(),
        metadata: DocumentMetadata {
            source: text("source"),
            offset: number("offset"),
            document_title: text("document_title"),
            chapter_number: text("chapter_number"),
            chapter_title: text("chapter_title"),
            section_title: text("section_title"),
            section_type: text("section_type"),
            word_count: number("word_count"),
            key_terms,
        },
    }
}
