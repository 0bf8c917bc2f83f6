use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use maitre_llm::extractor::Extractor;
use maitre_llm::provider::ChatProvider;
use maitre_memory::{PassageFilter, ScoredPoint, VectorStore};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::RetrieveError;

/// A passage returned from the index, ranked by descending relevance.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// A structured rewrite of the user question: the text to embed plus an
/// optional source-path restriction.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryPlan {
    pub search_text: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl QueryPlan {
    fn raw(question: &str) -> Self {
        Self {
            search_text: question.to_owned(),
            source: None,
        }
    }
}

/// Pluggable query-construction strategy. Planning is best-effort and
/// infallible: strategies fall back to the raw question internally.
pub trait QueryPlanner: Send + Sync {
    fn plan(&self, question: &str) -> Pin<Box<dyn Future<Output = QueryPlan> + Send + '_>>;
}

/// Uses the question verbatim with no metadata filter.
pub struct SemanticOnlyPlanner;

impl QueryPlanner for SemanticOnlyPlanner {
    fn plan(&self, question: &str) -> Pin<Box<dyn Future<Output = QueryPlan> + Send + '_>> {
        let plan = QueryPlan::raw(question);
        Box::pin(async move { plan })
    }
}

const SELF_QUERY_PREAMBLE: &str = "\
You turn a user question about restaurant training into a search request \
against a corpus of restaurant training documents (guest service, food and \
beverage procedures, hygiene, menu knowledge). Respond with JSON holding \
`search_text` (the semantic query) and optional `source` (a document path, \
only when the question explicitly names a specific document or file).";

/// Derives a filter + semantic query from the question via the language
/// model. Any rewrite failure falls back to an unfiltered search over
/// the raw question text.
pub struct SelfQueryPlanner<P> {
    provider: Arc<P>,
}

impl<P: ChatProvider> SelfQueryPlanner<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl<P: ChatProvider + 'static> QueryPlanner for SelfQueryPlanner<P> {
    fn plan(&self, question: &str) -> Pin<Box<dyn Future<Output = QueryPlan> + Send + '_>> {
        let question = question.to_owned();
        Box::pin(async move {
            let extractor = Extractor::new(&*self.provider).with_preamble(SELF_QUERY_PREAMBLE);
            match extractor.extract::<QueryPlan>(&question).await {
                Ok(plan) if !plan.search_text.trim().is_empty() => plan,
                Ok(_) => QueryPlan::raw(&question),
                Err(e) => {
                    tracing::debug!("self-query rewrite failed, using raw question: {e}");
                    QueryPlan::raw(&question)
                }
            }
        })
    }
}

/// Fetches the top-k passages for a question from the vector index.
pub struct Retriever<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    planner: Box<dyn QueryPlanner>,
    collection: String,
    k: u64,
    timeout: Duration,
}

impl<P: ChatProvider> Retriever<P> {
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        planner: Box<dyn QueryPlanner>,
        collection: impl Into<String>,
        k: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            planner,
            collection: collection.into(),
            k,
            timeout,
        }
    }

    /// Retrieve up to `k` passages relevant to the question. An empty
    /// index yields an empty result, never an error.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the index search fails, or the
    /// whole operation exceeds the retrieval timeout.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredPassage>, RetrieveError> {
        tokio::time::timeout(self.timeout, self.retrieve_inner(question))
            .await
            .map_err(|_| RetrieveError::Timeout)?
    }

    async fn retrieve_inner(&self, question: &str) -> Result<Vec<ScoredPassage>, RetrieveError> {
        let plan = self.planner.plan(question).await;
        let vector = self.provider.embed(&plan.search_text).await?;

        let filter = plan.source.map(PassageFilter::by_source);
        let points = self
            .store
            .search(&self.collection, vector, self.k, filter)
            .await?;

        Ok(points.into_iter().filter_map(point_to_passage).collect())
    }
}

fn point_to_passage(point: ScoredPoint) -> Option<ScoredPassage> {
    let text = point.payload.get("content")?.as_str()?.to_owned();
    let source = point
        .payload
        .get("source")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned();
    Some(ScoredPassage {
        text,
        source,
        score: point.score,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use maitre_llm::mock::MockProvider;
    use maitre_memory::{InMemoryVectorStore, VectorPoint, VectorStoreError};

    use super::*;

    const COLLECTION: &str = "training_documents";

    fn passage_point(id: &str, text: &str, source: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::from([
                ("content".into(), serde_json::json!(text)),
                ("source".into(), serde_json::json!(source)),
                ("chunk_index".into(), serde_json::json!(0)),
            ]),
        }
    }

    async fn seeded_store(provider: &MockProvider) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection(COLLECTION, 8).await.unwrap();
        let texts = [
            ("p1", "Always use a clean cloth.", "hygiene.txt"),
            ("p2", "Present the wine label to the host.", "wine.txt"),
            ("p3", "Seat guests within one minute.", "seating.txt"),
        ];
        let mut points = Vec::new();
        for (id, text, source) in texts {
            let vector = provider.embed(text).await.unwrap();
            points.push(passage_point(id, text, source, vector));
        }
        store.upsert(COLLECTION, points).await.unwrap();
        store
    }

    fn retriever(
        provider: Arc<MockProvider>,
        store: Arc<InMemoryVectorStore>,
        planner: Box<dyn QueryPlanner>,
        k: u64,
    ) -> Retriever<MockProvider> {
        Retriever::new(
            provider,
            store,
            planner,
            COLLECTION,
            k,
            Duration::from_secs(8),
        )
    }

    #[tokio::test]
    async fn empty_index_returns_empty_result() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(InMemoryVectorStore::new());
        let r = retriever(provider, store, Box::new(SemanticOnlyPlanner), 4);
        let passages = r.retrieve("anything").await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn retrieval_is_idempotent_against_unchanged_index() {
        let provider = Arc::new(MockProvider::default());
        let store = seeded_store(&provider).await;
        let r = retriever(provider, store, Box::new(SemanticOnlyPlanner), 3);

        let first = r.retrieve("how do I clean the table?").await.unwrap();
        let second = r.retrieve("how do I clean the table?").await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.source, b.source);
            assert!((a.score - b.score).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn k_bounds_result_count() {
        let provider = Arc::new(MockProvider::default());
        let store = seeded_store(&provider).await;
        let r = retriever(provider, store, Box::new(SemanticOnlyPlanner), 2);
        let passages = r.retrieve("service basics").await.unwrap();
        assert_eq!(passages.len(), 2);
    }

    #[tokio::test]
    async fn self_query_filter_restricts_sources() {
        // Scripted rewrite targets the hygiene document explicitly.
        let provider = Arc::new(MockProvider::with_responses(vec![
            r#"{"search_text": "cleaning cloths", "source": "hygiene.txt"}"#.into(),
        ]));
        let store = seeded_store(&provider).await;
        let planner = Box::new(SelfQueryPlanner::new(provider.clone()));
        let r = retriever(provider, store, planner, 4);

        let passages = r.retrieve("what does hygiene.txt say about cloths?").await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].source, "hygiene.txt");
    }

    #[tokio::test]
    async fn self_query_failure_falls_back_to_raw_question() {
        let provider = Arc::new(MockProvider::failing());
        // Embeddings still work on this mock; only chat fails.
        let store = seeded_store(&provider).await;
        let planner = Box::new(SelfQueryPlanner::new(provider.clone()));
        let r = retriever(provider.clone(), store, planner, 4);

        let passages = r.retrieve("clean cloth").await.unwrap();
        assert_eq!(passages.len(), 3);
        // Exactly one rewrite attempt was made before falling back.
        assert_eq!(provider.chat_calls(), 1);
    }

    #[tokio::test]
    async fn embed_failure_surfaces_as_retrieve_error() {
        let provider = Arc::new(MockProvider::failing_embed());
        let store = Arc::new(InMemoryVectorStore::new());
        let r = retriever(provider, store, Box::new(SemanticOnlyPlanner), 4);
        let err = r.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, RetrieveError::Embed(_)));
    }

    struct SlowStore;

    impl VectorStore for SlowStore {
        fn ensure_collection(
            &self,
            _collection: &str,
            _vector_size: u64,
        ) -> Pin<Box<dyn Future<Output = Result<(), VectorStoreError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn upsert(
            &self,
            _collection: &str,
            _points: Vec<VectorPoint>,
        ) -> Pin<Box<dyn Future<Output = Result<(), VectorStoreError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn search(
            &self,
            _collection: &str,
            _vector: Vec<f32>,
            _limit: u64,
            _filter: Option<PassageFilter>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoredPoint>, VectorStoreError>> + Send + '_>>
        {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            })
        }
    }

    #[tokio::test]
    async fn slow_index_times_out() {
        let provider = Arc::new(MockProvider::default());
        let r = Retriever::new(
            provider,
            Arc::new(SlowStore),
            Box::new(SemanticOnlyPlanner),
            COLLECTION,
            4,
            Duration::from_millis(50),
        );
        let err = r.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, RetrieveError::Timeout));
    }

    #[tokio::test]
    async fn malformed_points_are_skipped() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(InMemoryVectorStore::new());
        store.ensure_collection(COLLECTION, 2).await.unwrap();
        store
            .upsert(
                COLLECTION,
                vec![VectorPoint {
                    id: "broken".into(),
                    vector: vec![1.0, 0.0],
                    payload: HashMap::from([("source".into(), serde_json::json!("x.txt"))]),
                }],
            )
            .await
            .unwrap();

        let r = retriever(provider, store, Box::new(SemanticOnlyPlanner), 4);
        let passages = r.retrieve("anything").await.unwrap();
        assert!(passages.is_empty());
    }
}
