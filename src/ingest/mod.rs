// Ingestion pipeline
// chunks -> dense + sparse encoding -> hybrid records -> vector store
// chunks -> sparse encoding -> inverted index -> local JSON files


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::embeddings::{DenseEncoder, TextType};
use crate::local::{LocalIndex, LocalIndexStore};
use crate::records::{self, DocumentChunk, HybridRecord};
use crate::sparse::{SparseEncoder, Vocabulary};
use crate::store::{VectorStore, validate_collection_name};
use crate::{IndexError, Result, ValidationError};

pub const STATUS_CREATED: u16 = 201;
const CHUNK_FILE_EXTENSION: &str = "jsonl";

/// A request from the job/API layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub collection_name: String,
    #[serde(default)]
    pub file_paths: Vec<PathBuf>,
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}

/// Result reported back to the job/API layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResponse {
    pub status_code: u16,
    pub message: String,
}

impl IngestionResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub inserted_count: usize,
}

/// Where a batch ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    VectorStore,
    Local,
}

pub struct Ingestor {
    sparse: SparseEncoder,
    dense: Arc<dyn DenseEncoder>,
    store: VectorStore,
    local: LocalIndexStore,
}

impl std::fmt::Debug for Ingestor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("sparse", &self.sparse)
            .field("dense_dimension", &self.dense.dimension())
            .field("store", &self.store)
            .field("local", &self.local)
            .finish()
    }
}

impl Ingestor {
    #[inline]
    pub fn new(
        sparse: SparseEncoder,
        dense: Arc<dyn DenseEncoder>,
        store: VectorStore,
        local: LocalIndexStore,
    ) -> Self {
        Self {
            sparse,
            dense,
            store,
            local,
        }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    #[inline]
    pub fn local_store(&self) -> &LocalIndexStore {
        &self.local
    }

    /// Encode `chunks` and upsert them, with the batch vocabulary, into `collection`.
    #[inline]
    pub async fn ingest_batch(
        &self,
        chunks: Vec<DocumentChunk>,
        collection: &str,
    ) -> Result<IngestOutcome> {
        let (records, vocabulary) = self.prepare(chunks, collection).await?;
        let inserted_count = self.store.upsert(&records, &vocabulary, collection).await?;
        Ok(IngestOutcome { inserted_count })
    }

    /// Sparse-encode `chunks` and write them as an offline index, replacing
    /// any existing index for `collection`. The dense encoder is not used.
    #[inline]
    pub async fn ingest_batch_local(
        &self,
        chunks: Vec<DocumentChunk>,
        collection: &str,
    ) -> Result<IngestOutcome> {
        validate_batch(&chunks, collection)?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let (matrix, vocabulary) = self.sparse.encode(&texts)?;

        let index = LocalIndex::from_chunks(
            collection,
            &chunks,
            &matrix,
            &vocabulary,
            self.sparse.config(),
        )?;
        self.local.persist(collection, &index).await?;
        Ok(IngestOutcome {
            inserted_count: chunks.len(),
        })
    }

    /// Run a request end to end. Failures are reported in the response.
    #[inline]
    pub async fn ingest(&self, request: &IngestRequest) -> IngestionResponse {
        self.respond(request, Destination::VectorStore).await
    }

    #[inline]
    pub async fn ingest_local(&self, request: &IngestRequest) -> IngestionResponse {
        self.respond(request, Destination::Local).await
    }

    async fn respond(&self, request: &IngestRequest, destination: Destination) -> IngestionResponse {
        info!(
            "Starting documents ingestion into collection '{}'",
            request.collection_name
        );

        let result = self.run(request, destination).await;

        match result {
            Ok(outcome) => {
                info!(
                    "Ingested {} chunks into collection '{}'",
                    outcome.inserted_count, request.collection_name
                );
                IngestionResponse {
                    status_code: STATUS_CREATED,
                    message: format!(
                        "Successfully ingested {} chunks into collection '{}'.",
                        outcome.inserted_count, request.collection_name
                    ),
                }
            }
            Err(e) => {
                error!("Error while ingesting documents: {}", e);
                IngestionResponse {
                    status_code: e.status_code(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn run(&self, request: &IngestRequest, destination: Destination) -> Result<IngestOutcome> {
        validate_collection_name(&request.collection_name)?;
        let chunks = load_chunks(request).await?;
        match destination {
            Destination::VectorStore => self.ingest_batch(chunks, &request.collection_name).await,
            Destination::Local => {
                self.ingest_batch_local(chunks, &request.collection_name)
                    .await
            }
        }
    }

    async fn prepare(
        &self,
        chunks: Vec<DocumentChunk>,
        collection: &str,
    ) -> Result<(Vec<HybridRecord>, Vocabulary)> {
        validate_batch(&chunks, collection)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let titles: Vec<String> = chunks.iter().map(|c| c.title().to_string()).collect();

        let dense = Arc::clone(&self.dense);
        let dense_texts = texts.clone();
        let dense_vectors = tokio::task::spawn_blocking(move || {
            dense.dense_encode(&dense_texts, &titles, TextType::Document)
        })
        .await
        .map_err(|e| IndexError::Embedding(format!("Embedding task failed: {}", e)))??;
        debug!("Generated {} dense embeddings", dense_vectors.len());

        let (matrix, vocabulary) = self.sparse.encode(&texts)?;
        debug!(
            "Generated sparse embeddings with shape {:?}",
            matrix.shape()
        );

        let records = records::build(
            chunks,
            dense_vectors,
            &matrix,
            &vocabulary,
            self.dense.dimension(),
        )?;
        Ok((records, vocabulary))
    }
}

/// Checks shared by both destinations, before any encoding.
fn validate_batch(chunks: &[DocumentChunk], collection: &str) -> Result<()> {
    validate_collection_name(collection)?;
    if chunks.is_empty() {
        return Err(ValidationError::EmptyBatch.into());
    }
    records::validate_ids(chunks.iter().map(|c| c.id))?;
    Ok(())
}

/// Read chunks from the request's JSON-lines files, or from every `*.jsonl`
/// file in its directory (sorted by name).
#[inline]
pub async fn load_chunks(request: &IngestRequest) -> Result<Vec<DocumentChunk>> {
    let files = chunk_files(request).await?;
    let mut chunks = Vec::new();

    for file in &files {
        let content = tokio::fs::read_to_string(file).await?;
        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let chunk: DocumentChunk = serde_json::from_str(line).map_err(|e| {
                IndexError::InvalidInput(format!(
                    "{}:{}: invalid chunk: {}",
                    file.display(),
                    line_number + 1,
                    e
                ))
            })?;
            chunks.push(chunk);
        }
    }

    if chunks.is_empty() {
        return Err(IndexError::InvalidInput(
            "No chunks were found in the provided documents".to_string(),
        ));
    }

    debug!("Loaded {} chunks from {} files", chunks.len(), files.len());
    Ok(chunks)
}

async fn chunk_files(request: &IngestRequest) -> Result<Vec<PathBuf>> {
    if !request.file_paths.is_empty() {
        return Ok(request.file_paths.clone());
    }

    let Some(dir) = &request.file_dir else {
        return Err(IndexError::InvalidInput(
            "No file paths or directory provided".to_string(),
        ));
    };

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_chunk_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_chunk_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == CHUNK_FILE_EXTENSION)
}
