//! Batch ingestion driver
//!
//! Usage: refbase-ingest <path> [<path> ...]
//!
//! Reads configuration from the environment, walks the given files or
//! directories, and ingests every supported document. Reports
//! per-document outcomes and exits nonzero when any document failed.

use refbase::embed::cache::EmbeddingCache;
use refbase::embed::service::EmbeddingService;
use refbase::embed::tracker::TokenTracker;
use refbase::ingest::markdown::MarkdownParser;
use refbase::ingest::pipeline::IngestionPipeline;
use refbase::ingest::DocumentParser;
use refbase::{create_embedder, create_store, KnowledgeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: refbase-ingest <path> [<path> ...]");
        std::process::exit(2);
    }

    let config = KnowledgeConfig::from_env();
    let errors = config.validate();
    if !errors.is_empty() {
        eprintln!("configuration errors:");
        for error in errors {
            eprintln!("  - {error}");
        }
        std::process::exit(2);
    }

    let parsers: Vec<Box<dyn DocumentParser>> = vec![Box::new(MarkdownParser::new())];
    let paths = collect_paths(&args, &parsers)?;
    if paths.is_empty() {
        eprintln!("no supported documents found");
        std::process::exit(0);
    }

    let provider = create_embedder(&config)?;
    let cache = EmbeddingCache::open(
        &config.cache.dir,
        provider.model_name(),
        config.cache.size_limit_bytes,
    )
    .await?;
    let tracker = Arc::new(TokenTracker::new(&config.tracking, provider.model_name()));
    let embeddings = Arc::new(EmbeddingService::new(
        provider,
        cache,
        Arc::clone(&tracker),
        config.embedding.batch_size,
        config.embedding.max_retries,
    ));
    let store = create_store(&config).await?;

    let pipeline = IngestionPipeline::new(&config, parsers, embeddings, store);

    println!("Ingesting {} document(s)...", paths.len());
    let report = pipeline.ingest_paths(&paths).await;

    for doc in &report.succeeded {
        println!(
            "  OK   {}: {} chunks, {} tokens ({} cache hits)",
            doc.document_id, doc.chunks_stored, doc.tokens_embedded, doc.cache_hits
        );
    }
    for (path, error) in &report.failed {
        println!("  FAIL {}: {error}", path.display());
    }

    println!(
        "\nProcessed {}/{} documents, {} chunks total",
        report.succeeded.len(),
        paths.len(),
        report.total_chunks()
    );
    let usage = tracker.daily_summary(None);
    println!(
        "Embedded {} tokens today (~${:.4})",
        usage.embedding_tokens,
        tracker.estimate_cost(None)
    );

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// Expand file and directory arguments into supported document paths
fn collect_paths(
    args: &[String],
    parsers: &[Box<dyn DocumentParser>],
) -> anyhow::Result<Vec<PathBuf>> {
    let supported = |path: &PathBuf| parsers.iter().any(|p| p.supports(path));
    let mut paths = Vec::new();

    for arg in args {
        let path = PathBuf::from(arg);
        if path.is_dir() {
            for entry in std::fs::read_dir(&path)? {
                let candidate = entry?.path();
                if candidate.is_file() && supported(&candidate) {
                    paths.push(candidate);
                }
            }
        } else {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
