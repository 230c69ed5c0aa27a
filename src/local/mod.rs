// Offline index persistence
// Stores a collection as four JSON files: vocabulary, inverted index,
// document bodies and index metadata.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::records::{DocumentChunk, Metadata};
use crate::sparse::{SparseConfig, SparseMatrix, Vocabulary};
use crate::store::validate_collection_name;
use crate::{IndexError, Result, ValidationError};

pub const VOCABULARY_FILE: &str = "vocab.json";
pub const POSTINGS_FILE: &str = "inv_index.json";
pub const DOCUMENTS_FILE: &str = "docs.json";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: Uuid,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub text: String,
    pub metadata: Metadata,
}

/// Summary written to `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub collection: String,
    pub num_docs: usize,
    pub vocab_size: usize,
    /// Mean number of distinct indexed terms per document
    pub avg_doc_terms: f64,
    pub sparse: SparseConfig,
    pub created_at: DateTime<Utc>,
}

/// A whole collection held in memory in inverted-index form.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIndex {
    pub vocabulary: Vocabulary,
    pub postings: BTreeMap<String, Vec<Posting>>,
    pub docs: BTreeMap<Uuid, StoredDocument>,
    pub meta: IndexMeta,
}

impl LocalIndex {
    /// Invert the sparse rows of `matrix` into per-term posting lists.
    ///
    /// Row `i` of `matrix` belongs to `chunks[i]`. Postings keep chunk order
    /// within each term. No dense vectors are involved.
    #[inline]
    pub fn from_chunks(
        collection: &str,
        chunks: &[DocumentChunk],
        matrix: &SparseMatrix,
        vocabulary: &Vocabulary,
        sparse: &SparseConfig,
    ) -> Result<Self> {
        let expected = (chunks.len(), vocabulary.len());
        if matrix.shape() != expected {
            return Err(ValidationError::SparseShapeMismatch {
                expected,
                actual: matrix.shape(),
            }
            .into());
        }

        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut docs = BTreeMap::new();
        let mut total_terms = 0_usize;

        for (chunk, row) in chunks.iter().zip(matrix.rows()) {
            for (column, weight) in row.iter() {
                let term = vocabulary.term(column).ok_or_else(|| {
                    IndexError::InvalidInput(format!(
                        "chunk {} references column {} outside a vocabulary of {} terms",
                        chunk.id,
                        column,
                        vocabulary.len()
                    ))
                })?;
                postings.entry(term.to_string()).or_default().push(Posting {
                    doc_id: chunk.id,
                    weight,
                });
            }
            total_terms += row.len();
            docs.insert(
                chunk.id,
                StoredDocument {
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                },
            );
        }

        let avg_doc_terms = if chunks.is_empty() {
            0.0
        } else {
            total_terms as f64 / chunks.len() as f64
        };

        Ok(Self {
            vocabulary: vocabulary.clone(),
            postings,
            docs,
            meta: IndexMeta {
                collection: collection.to_string(),
                num_docs: chunks.len(),
                vocab_size: vocabulary.len(),
                avg_doc_terms,
                sparse: sparse.clone(),
                created_at: Utc::now(),
            },
        })
    }
}

/// Directory of per-collection JSON indexes
#[derive(Debug, Clone)]
pub struct LocalIndexStore {
    root: PathBuf,
}

impl LocalIndexStore {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Write all four files, replacing whatever was there.
    ///
    /// Files are written one after another; a failure part way leaves the
    /// earlier files updated.
    #[inline]
    pub async fn persist(&self, collection: &str, index: &LocalIndex) -> Result<()> {
        validate_collection_name(collection)?;
        let dir = self.collection_dir(collection);
        tokio::fs::create_dir_all(&dir).await?;

        write_json(&dir.join(VOCABULARY_FILE), &index.vocabulary).await?;
        write_json(&dir.join(POSTINGS_FILE), &index.postings).await?;
        write_json(&dir.join(DOCUMENTS_FILE), &index.docs).await?;
        write_json(&dir.join(META_FILE), &index.meta).await?;

        info!(
            "Persisted local index '{}' ({} docs, {} terms) to {}",
            collection,
            index.meta.num_docs,
            index.meta.vocab_size,
            dir.display()
        );
        Ok(())
    }

    #[inline]
    pub async fn load(&self, collection: &str) -> Result<LocalIndex> {
        validate_collection_name(collection)?;
        let dir = self.collection_dir(collection);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(IndexError::InvalidInput(format!(
                "no local index for collection '{}' under {}",
                collection,
                self.root.display()
            )));
        }

        Ok(LocalIndex {
            vocabulary: read_json(&dir.join(VOCABULARY_FILE)).await?,
            postings: read_json(&dir.join(POSTINGS_FILE)).await?,
            docs: read_json(&dir.join(DOCUMENTS_FILE)).await?,
            meta: read_json(&dir.join(META_FILE)).await?,
        })
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    tokio::fs::write(path, bytes).await?;
    debug!("Wrote {}", path.display());
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
