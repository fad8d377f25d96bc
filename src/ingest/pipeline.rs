//! Ingestion pipeline: parse, chunk, embed, store

use super::chunker::HierarchicalChunker;
use super::{parser_for, DocumentParser, ParsedDocument};
use crate::config::KnowledgeConfig;
use crate::embed::service::EmbeddingService;
use crate::error::{Result, RetrievalError};
use crate::store::VectorStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of ingesting a single document
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub document_id: String,
    pub chunks_stored: usize,
    pub tokens_embedded: usize,
    pub cache_hits: u64,
    pub oversize_chunks: usize,
}

/// Outcome of a multi-document run
///
/// One document failing never aborts the batch; the driver reports
/// per-document results and the binary exits nonzero when any failed.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<IngestionReport>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_chunks(&self) -> usize {
        self.succeeded.iter().map(|r| r.chunks_stored).sum()
    }
}

/// Drives documents through parse, chunk, embed, and store
pub struct IngestionPipeline {
    parsers: Vec<Box<dyn DocumentParser>>,
    chunker: HierarchicalChunker,
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    pub fn new(
        config: &KnowledgeConfig,
        parsers: Vec<Box<dyn DocumentParser>>,
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let chunker =
            HierarchicalChunker::new(config.chunking.clone(), config.embedding.model.clone());
        Self {
            parsers,
            chunker,
            embeddings,
            store,
        }
    }

    /// Ingest one parsed document
    ///
    /// Element order is preserved through chunking and embedding, so
    /// section hierarchies reconstruct deterministically.
    pub async fn ingest_document(&self, document: &ParsedDocument) -> Result<IngestionReport> {
        let hits_before = self.embeddings.tracker().daily_summary(None).cache_hits;

        let mut chunks = self
            .chunker
            .chunk(&document.elements, &document.metadata)?;
        if chunks.is_empty() {
            return Err(RetrievalError::Ingestion(format!(
                "document {} produced no chunks",
                document.metadata.document_id
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;

        let model_name = self.embeddings.model_name().to_string();
        let mut tokens_embedded = 0usize;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            tokens_embedded += chunk.token_count;
            chunk.embedding = vector;
            chunk.embedding_model = model_name.clone();
        }

        let oversize_chunks = chunks
            .iter()
            .filter(|c| c.token_count > self.chunker_max_tokens())
            .count();

        let stored = self.store.add_chunks(&chunks).await?;
        let hits_after = self.embeddings.tracker().daily_summary(None).cache_hits;

        info!(
            document_id = %document.metadata.document_id,
            chunks = stored,
            tokens = tokens_embedded,
            "document ingested"
        );

        Ok(IngestionReport {
            document_id: document.metadata.document_id.clone(),
            chunks_stored: stored,
            tokens_embedded,
            cache_hits: hits_after.saturating_sub(hits_before),
            oversize_chunks,
        })
    }

    /// Parse and ingest one file
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestionReport> {
        let parser = parser_for(&self.parsers, path)?;
        let document = parser.parse(path)?;
        self.ingest_document(&document).await
    }

    /// Ingest many files, isolating per-document failures
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for path in paths {
            match self.ingest_path(path).await {
                Ok(doc_report) => report.succeeded.push(doc_report),
                Err(e) => {
                    error!(path = %path.display(), code = e.error_code(), error = %e, "ingestion failed");
                    report.failed.push((path.clone(), e.to_string()));
                }
            }
        }

        report
    }

    fn chunker_max_tokens(&self) -> usize {
        self.chunker.max_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::embed::cache::EmbeddingCache;
    use crate::embed::tracker::TokenTracker;
    use crate::embed::Embedder;
    use crate::ingest::markdown::MarkdownParser;
    use crate::store::sqlite::SqliteStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct HashEmbedder;

    impl HashEmbedder {
        fn vector_for(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; 4];
            for (i, b) in text.bytes().enumerate() {
                v[i % 4] += b as f32 / 255.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter().map(|x| x / norm.max(1e-6)).collect()
        }
    }

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn dimensions(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "m-test"
        }
        async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            Ok(Self::vector_for(text))
        }
        async fn embed_batch(
            &self,
            texts: &[String],
            _batch_size: usize,
        ) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
        }
    }

    async fn pipeline() -> (IngestionPipeline, Arc<SqliteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = KnowledgeConfig::default();
        config.store.backend = "sqlite".to_string();
        config.store.sqlite_path = "sqlite::memory:".to_string();
        config.embedding.dimensions = 4;
        config.chunking.target_tokens = 60;
        config.chunking.max_tokens = 200;
        config.chunking.overlap_tokens = 0;

        let cache = EmbeddingCache::open(dir.path(), "m-test", 1024 * 1024)
            .await
            .unwrap();
        let tracker = Arc::new(TokenTracker::new(&TrackingConfig::default(), "m-test"));
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(HashEmbedder),
            cache,
            tracker,
            8,
            0,
        ));
        let store = Arc::new(SqliteStore::open(&config).await.unwrap());

        let pipeline = IngestionPipeline::new(
            &config,
            vec![Box::new(MarkdownParser::new())],
            embeddings,
            Arc::clone(&store) as Arc<dyn VectorStore>,
        );
        (pipeline, store, dir)
    }

    fn write_doc(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ingest_path_end_to_end() {
        let (pipeline, store, dir) = pipeline().await;
        let path = write_doc(
            &dir,
            "standard.md",
            "# 5 Requirements\n\nThe system SHALL verify all interfaces before integration review.\n\n## 5.1 Entry criteria\n\nEntry criteria include an approved baseline and completed inspections.\n",
        );

        let report = pipeline.ingest_path(&path).await.unwrap();
        assert!(report.chunks_stored >= 1);
        assert!(report.tokens_embedded > 0);

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_chunks, report.chunks_stored);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (pipeline, _store, dir) = pipeline().await;
        let good = write_doc(&dir, "good.md", "# One\n\nSome perfectly fine content here.\n");
        let missing = dir.path().join("missing.md");
        let unsupported = write_doc(&dir, "binary.docx", "not parseable");

        let report = pipeline
            .ingest_paths(&[good, missing, unsupported])
            .await;

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.all_succeeded());
        assert!(report.total_chunks() >= 1);
    }

    #[tokio::test]
    async fn test_empty_document_is_an_error() {
        let (pipeline, _store, dir) = pipeline().await;
        let empty = write_doc(&dir, "empty.md", "");

        let err = pipeline.ingest_path(&empty).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_input");
    }

    #[tokio::test]
    async fn test_reingest_hits_cache() {
        let (pipeline, _store, dir) = pipeline().await;
        let path = write_doc(&dir, "doc.md", "# A\n\nRepeatable content for cache hits.\n");

        let first = pipeline.ingest_path(&path).await.unwrap();
        assert_eq!(first.cache_hits, 0);

        let second = pipeline.ingest_path(&path).await.unwrap();
        assert_eq!(second.cache_hits as usize, second.chunks_stored);
    }
}
