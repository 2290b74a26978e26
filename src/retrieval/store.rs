use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::document::{Document, ScoredDocument};
use crate::retrieval::cosine_similarity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub points_count: u64,
    pub status: String,
    pub dimension: Option<usize>,
}

/// Stores (vector, document) pairs and answers nearest-neighbour queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Creates the collection for `dimension`-wide cosine vectors if it is missing.
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    async fn upsert(&self, documents: &[Document], vectors: Vec<Vec<f32>>) -> Result<usize>;

    /// At most `top_k` hits, highest score first. Hits scoring below
    /// `score_threshold` are left out when one is given.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>>;

    async fn stats(&self) -> Result<CollectionStats>;
}

/// Brute-force cosine store held in memory.
pub struct MemoryStore {
    name: String,
    dimension: RwLock<Option<usize>>,
    points: RwLock<HashMap<Uuid, (Document, Vec<f32>)>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: RwLock::new(None),
            points: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        match *self.dimension.read() {
            Some(dim) if dim != len => {
                anyhow::bail!("Vector dimension mismatch: collection expects {}, got {}", dim, len)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let mut current = self.dimension.write();
        match *current {
            Some(dim) if dim != dimension => {
                anyhow::bail!(
                    "Collection {} already exists with dimension {}, requested {}",
                    self.name,
                    dim,
                    dimension
                )
            }
            Some(_) => Ok(()),
            None => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, documents: &[Document], vectors: Vec<Vec<f32>>) -> Result<usize> {
        if documents.len() != vectors.len() {
            anyhow::bail!("Got {} documents but {} vectors", documents.len(), vectors.len());
        }
        if self.dimension.read().is_none() {
            anyhow::bail!("Collection {} does not exist", self.name);
        }
        for vector in &vectors {
            self.check_dimension(vector.len())?;
        }

        let mut points = self.points.write();
        for (doc, vector) in documents.iter().zip(vectors) {
            points.insert(doc.id, (doc.clone(), vector));
        }
        Ok(documents.len())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredDocument>> {
        self.check_dimension(query_vector.len())?;

        let points = self.points.read();
        let mut hits: Vec<ScoredDocument> = points
            .values()
            .map(|(doc, vector)| ScoredDocument {
                document: doc.clone(),
                score: cosine_similarity(query_vector, vector),
            })
            .filter(|hit| score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k as usize);
        Ok(hits)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let dimension = *self.dimension.read();
        Ok(CollectionStats {
            name: self.name.clone(),
            points_count: self.len() as u64,
            status: if dimension.is_some() { "green" } else { "missing" }.to_string(),
            dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text)
    }

    #[tokio::test]
    async fn search_returns_top_k_in_descending_order() {
        let store = MemoryStore::new("test");
        store.ensure_collection(2).await.unwrap();
        store
            .upsert(
                &[doc("east"), doc("north"), doc("north-east")],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .await
            .unwrap();

        let hits = store.search(&[0.0, 1.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.content, "north");
        assert_eq!(hits[1].document.content, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn threshold_drops_weak_hits() {
        let store = MemoryStore::new("test");
        store.ensure_collection(2).await.unwrap();
        store
            .upsert(&[doc("a"), doc("b")], vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, Some(0.5)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "a");
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() {
        let store = MemoryStore::new("test");
        store.ensure_collection(3).await.unwrap();
        assert!(store.upsert(&[doc("a")], vec![vec![1.0, 0.0]]).await.is_err());
        assert!(store.search(&[1.0, 0.0], 1, None).await.is_err());
        assert!(store.ensure_collection(4).await.is_err());
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let store = MemoryStore::new("test");
        store.ensure_collection(2).await.unwrap();
        let first = doc("v1");
        let mut second = first.clone();
        second.content = "v2".into();

        store.upsert(&[first], vec![vec![1.0, 0.0]]).await.unwrap();
        store.upsert(&[second], vec![vec![1.0, 0.0]]).await.unwrap();

        assert_eq!(store.len(), 1);
        let hits = store.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(hits[0].document.content, "v2");
    }

    #[tokio::test]
    async fn empty_store_returns_no_hits() {
        let store = MemoryStore::new("test");
        store.ensure_collection(2).await.unwrap();
        assert!(store.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap().points_count, 0);
    }
}
