//! Reference document ingestion.
//!
//! Turns an uploaded PDF into searchable passages:
//!
//! ```text
//! PDF bytes → extract text → paragraph chunks → embed each → upsert to the vector index
//! ```
//!
//! Vector ids are derived from the document name, so re-ingesting a file
//! overwrites its earlier passages instead of duplicating them. The first
//! chunk that fails to embed or upsert aborts the run.
//!
//! Text extraction is CPU-bound and runs on the blocking thread pool so a
//! large upload does not stall chat turns on the same runtime.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunk::split_paragraph_chunks;
use crate::config::Config;
use crate::embedding::{Embedder, HuggingFaceEmbedder};
use crate::extract::extract_pdf_text;
use crate::vector_store::{PassageMetadata, PineconeIndex, VectorIndex, VectorRecord};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub source: String,
    /// Hex SHA-256 of the uploaded bytes, for audit logs.
    pub sha256: String,
    pub characters: usize,
    pub chunks: usize,
}

pub fn document_fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Vector id for chunk `index` of `source`: whitespace runs become `_`.
pub fn vector_id_for(source: &str, index: usize) -> String {
    let mut name = String::with_capacity(source.len());
    let mut in_space = false;
    for c in source.chars() {
        if c.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
        } else {
            name.push(c);
            in_space = false;
        }
    }
    format!("{}_chunk_{}", name, index)
}

/// Extract, chunk, embed and upsert one PDF document.
pub async fn ingest_document(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    bytes: &[u8],
    source: &str,
    min_chunk_chars: usize,
) -> Result<IngestReport> {
    let sha256 = document_fingerprint(bytes);
    info!(source, sha256 = %sha256, "starting ingestion");

    let owned = bytes.to_vec();
    let text = tokio::task::spawn_blocking(move || extract_pdf_text(&owned))
        .await
        .context("PDF extraction task failed")?
        .with_context(|| format!("reading {}", source))?;
    let chunks = split_paragraph_chunks(&text, min_chunk_chars);
    info!(
        source,
        characters = text.len(),
        chunks = chunks.len(),
        "extracted document"
    );

    for (i, chunk) in chunks.iter().enumerate() {
        let values = embedder.embed(chunk).await.map_err(|e| {
            warn!(source, chunk = i, error = %e, "embedding failed");
            e
        })?;
        let record = VectorRecord {
            id: vector_id_for(source, i),
            values,
            metadata: PassageMetadata {
                text: Some(chunk.clone()),
                source: Some(source.to_string()),
            },
        };
        index.upsert(vec![record]).await.map_err(|e| {
            warn!(source, chunk = i, error = %e, "upsert failed");
            e
        })?;
    }

    info!(source, chunks = chunks.len(), "ingestion complete");
    Ok(IngestReport {
        source: source.to_string(),
        sha256,
        characters: text.len(),
        chunks: chunks.len(),
    })
}

/// CLI entry point: ingest a PDF from disk using the configured services.
pub async fn run_ingest(config: &Config, path: &std::path::Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let client = crate::http::build_client(config)?;
    let embedder = HuggingFaceEmbedder::from_config(client.clone(), config);
    let index = PineconeIndex::from_config(client, config)?;

    let report = ingest_document(
        &embedder,
        &index,
        &bytes,
        &source,
        config.ingest.min_chunk_chars,
    )
    .await?;

    println!(
        "Ingested {} ({}): {} characters, {} chunks",
        report.source, report.sha256, report.characters, report.chunks
    );
    Ok(())
}
