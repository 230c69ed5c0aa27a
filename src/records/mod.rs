// Hybrid record construction
// Joins dense vectors, sparse rows, text and metadata into one record per chunk

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use crate::ValidationError;
use crate::sparse::{SparseMatrix, SparseRow, Vocabulary};

/// Identifier reserved for the record carrying a collection's vocabulary.
pub const VOCABULARY_RECORD_ID: Uuid = Uuid::nil();

/// Title reported to the embedder when a chunk has none
pub const DEFAULT_TITLE: &str = "none";

pub type DenseVector = Vec<f32>;

/// Chunk metadata; keys are kept sorted so serialized payloads are stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A chunk of a source document as produced by the chunking pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentChunk {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    #[inline]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The chunk's `title` metadata, or [`DEFAULT_TITLE`]
    #[inline]
    pub fn title(&self) -> &str {
        match self.metadata.get("title") {
            Some(MetadataValue::String(title)) => title,
            _ => DEFAULT_TITLE,
        }
    }
}

/// The unit handed to a store: one per chunk, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridRecord {
    id: Uuid,
    dense_vector: DenseVector,
    sparse_row: SparseRow,
    text: String,
    metadata: Metadata,
}

impl HybridRecord {
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn dense_vector(&self) -> &[f32] {
        &self.dense_vector
    }

    #[inline]
    pub fn sparse_row(&self) -> &SparseRow {
        &self.sparse_row
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Pair every chunk with its dense vector and sparse row.
///
/// Output order matches `chunks`. Nothing is produced unless every check
/// passes.
#[inline]
pub fn build(
    chunks: Vec<DocumentChunk>,
    dense_vectors: Vec<DenseVector>,
    sparse_matrix: &SparseMatrix,
    vocabulary: &Vocabulary,
    expected_dim: usize,
) -> Result<Vec<HybridRecord>, ValidationError> {
    if chunks.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    if dense_vectors.len() != chunks.len() {
        return Err(ValidationError::DenseCountMismatch {
            expected: chunks.len(),
            actual: dense_vectors.len(),
        });
    }

    if let Some((index, vector)) = dense_vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != expected_dim)
    {
        return Err(ValidationError::DenseDimMismatch {
            index,
            expected: expected_dim,
            actual: vector.len(),
        });
    }

    let expected_shape = (chunks.len(), vocabulary.len());
    if sparse_matrix.shape() != expected_shape {
        return Err(ValidationError::SparseShapeMismatch {
            expected: expected_shape,
            actual: sparse_matrix.shape(),
        });
    }

    validate_ids(chunks.iter().map(|c| c.id))?;

    let records: Vec<HybridRecord> = chunks
        .into_iter()
        .zip(dense_vectors)
        .zip(sparse_matrix.rows())
        .map(|((chunk, dense_vector), sparse_row)| HybridRecord {
            id: chunk.id,
            dense_vector,
            sparse_row,
            text: chunk.text,
            metadata: chunk.metadata,
        })
        .collect();

    debug!("Built {} hybrid records", records.len());
    Ok(records)
}

/// Reject the reserved vocabulary id and ids repeated within one batch.
#[inline]
pub fn validate_ids(ids: impl IntoIterator<Item = Uuid>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id == VOCABULARY_RECORD_ID {
            return Err(ValidationError::ReservedId(id));
        }
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateId(id));
        }
    }
    Ok(())
}
