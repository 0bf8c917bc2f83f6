use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use crate::vector_store::{
    PassageFilter, ScoredPoint, VectorPoint, VectorStore, VectorStoreError,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// In-process passage index used by tests and the offline chat mode.
///
/// Points live in insertion order and ranking uses a stable sort, so
/// equal-score results come back in the order they were indexed.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorPoint>>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &PassageFilter) -> bool {
    match &filter.source {
        Some(source) => payload.get("source").and_then(|v| v.as_str()) == Some(source.as_str()),
        None => true,
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection).or_default();
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.entry(collection).or_default();
            for point in points {
                // Replace in place keeps the original insertion position.
                if let Some(existing) = col.iter_mut().find(|p| p.id == point.id) {
                    *existing = point;
                } else {
                    col.push(point);
                }
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<PassageFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let empty = PassageFilter::default();
            let f = filter.as_ref().unwrap_or(&empty);

            let mut scored: Vec<ScoredPoint> = col
                .iter()
                .filter(|p| matches_filter(&p.payload, f))
                .map(|p| ScoredPoint {
                    id: p.id.clone(),
                    score: cosine_similarity(&vector, &p.vector),
                    payload: p.payload.clone(),
                })
                .collect();

            // Stable sort: ties keep index insertion order.
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            #[expect(clippy::cast_possible_truncation)]
            scored.truncate(limit as usize);
            Ok(scored)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, source: &str) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([("source".into(), serde_json::json!(source))]),
        }
    }

    #[tokio::test]
    async fn search_missing_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        let results = store.search("none", vec![1.0], 4, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("docs", 3).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point("far", vec![0.0, 1.0, 0.0], "a.txt"),
                    point("near", vec![1.0, 0.0, 0.0], "b.txt"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("docs", vec![1.0, 0.0, 0.0], 2, None)
            .await
            .unwrap();
        assert_eq!(results[0].id, "near");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point("first", vec![1.0, 0.0], "a.txt"),
                    point("second", vec![1.0, 0.0], "b.txt"),
                    point("third", vec![1.0, 0.0], "c.txt"),
                ],
            )
            .await
            .unwrap();

        let results = store.search("docs", vec![1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn source_filter_restricts_candidates() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point("a", vec![1.0, 0.0], "wine.txt"),
                    point("b", vec![0.9, 0.1], "hygiene.txt"),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search(
                "docs",
                vec![1.0, 0.0],
                10,
                Some(PassageFilter::by_source("hygiene.txt")),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_in_place() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("docs", 2).await.unwrap();
        store
            .upsert("docs", vec![point("a", vec![1.0, 0.0], "old.txt")])
            .await
            .unwrap();
        store
            .upsert("docs", vec![point("a", vec![0.0, 1.0], "new.txt")])
            .await
            .unwrap();

        let results = store.search("docs", vec![0.0, 1.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].payload.get("source").unwrap().as_str().unwrap(),
            "new.txt"
        );
    }

    #[tokio::test]
    async fn limit_bounds_results() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("docs", 2).await.unwrap();
        let points = (0..10)
            .map(|i| point(&format!("p{i}"), vec![1.0, 0.0], "s.txt"))
            .collect();
        store.upsert("docs", points).await.unwrap();

        let results = store.search("docs", vec![1.0, 0.0], 4, None).await.unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
    }
}
