use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use maitre_llm::ChatProvider;
use uuid::Uuid;

use super::error::DocumentError;
use super::loader::{DocumentLoader, TextLoader};
use super::splitter::PassageSplitter;
use super::types::Passage;
use crate::vector_store::{VectorPoint, VectorStore};

/// Mirrors the corpus loader's bounded multithreading.
const MAX_CONCURRENT_FILES: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub passages_indexed: usize,
}

/// Walks a docs root, splits files into passages, embeds them, and
/// upserts the result into the vector store.
pub struct IngestionPipeline<P> {
    splitter: PassageSplitter,
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    collection: String,
}

impl<P: ChatProvider> IngestionPipeline<P> {
    pub fn new(
        splitter: PassageSplitter,
        store: Arc<dyn VectorStore>,
        provider: Arc<P>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            splitter,
            store,
            provider,
            collection: collection.into(),
        }
    }

    /// Recursively ingest every supported file under `root`.
    ///
    /// Per-file failures (unreadable, oversized, embedding error) are
    /// logged and skipped; a missing or empty directory yields an empty
    /// report so the service can still start.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory walk itself fails.
    pub async fn ingest_dir(&self, root: &Path) -> Result<IngestReport, DocumentError> {
        if !root.exists() {
            tracing::warn!(root = %root.display(), "docs directory missing, starting with an empty index");
            return Ok(IngestReport::default());
        }

        let loader = TextLoader::default();
        let files = collect_files(root, loader.supported_extensions());
        tracing::info!(count = files.len(), root = %root.display(), "ingesting documents");

        let results: Vec<(PathBuf, Result<usize, DocumentError>)> =
            futures::stream::iter(files.into_iter().map(|path| async {
                let result = self.ingest_file(&loader, &path).await;
                (path, result)
            }))
            .buffer_unordered(MAX_CONCURRENT_FILES)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (path, result) in results {
            match result {
                Ok(count) => {
                    report.files_indexed += 1;
                    report.passages_indexed += count;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), "skipping unreadable document: {e}");
                    report.files_skipped += 1;
                }
            }
        }

        tracing::info!(
            files = report.files_indexed,
            skipped = report.files_skipped,
            passages = report.passages_indexed,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn ingest_file(
        &self,
        loader: &TextLoader,
        path: &Path,
    ) -> Result<usize, DocumentError> {
        let documents = loader.load(path).await?;

        let mut points = Vec::new();
        for document in &documents {
            for passage in self.splitter.split(document) {
                let vector = self.provider.embed(&passage.text).await?;
                points.push(passage_to_point(&passage, vector));
            }
        }

        if points.is_empty() {
            return Ok(0);
        }

        let vector_size = points[0].vector.len() as u64;
        self.store
            .ensure_collection(&self.collection, vector_size)
            .await?;

        let count = points.len();
        self.store.upsert(&self.collection, points).await?;
        Ok(count)
    }
}

fn passage_to_point(passage: &Passage, vector: Vec<f32>) -> VectorPoint {
    VectorPoint {
        id: Uuid::new_v4().to_string(),
        vector,
        payload: HashMap::from([
            ("source".to_owned(), serde_json::json!(passage.source)),
            (
                "chunk_index".to_owned(),
                serde_json::json!(passage.chunk_index),
            ),
            ("content".to_owned(), serde_json::json!(passage.text)),
        ]),
    }
}

fn collect_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build().flatten() {
        let path = entry.path();
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if extensions.contains(&ext) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}
