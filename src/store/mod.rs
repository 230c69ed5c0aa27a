// Vector-store adapter
// Owns the hybrid collection schema and performs validated batch upserts
// through a pluggable StoreClient (LanceDB or in-memory)


pub mod lance;
pub mod memory;

pub use lance::LanceClient;
pub use memory::MemoryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::records::{DenseVector, HybridRecord, Metadata, VOCABULARY_RECORD_ID, validate_ids};
use crate::sparse::{SparseRow, Vocabulary};
use crate::{IndexError, Result, ValidationError};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const MAX_COLLECTION_NAME_LEN: usize = 255;

/// Similarity used by the dense ANN index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclid => "euclid",
        };
        f.write_str(name)
    }
}

/// HNSW graph parameters for the dense field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: u32,
    pub ef_construct: u32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construct: 100,
        }
    }
}

/// Layout of a hybrid collection. Fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dense_field_name: String,
    pub sparse_field_name: String,
    pub dense_dim: usize,
    pub distance_metric: DistanceMetric,
    pub index_params: HnswParams,
}

/// Vector store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB URI; defaults to `<base_dir>/vectors`
    pub uri: Option<String>,
    pub dense_field_name: String,
    pub sparse_field_name: String,
    pub embedding_dimension: u32,
    pub distance: DistanceMetric,
    pub hnsw_m: u32,
    pub hnsw_ef_construct: u32,
    pub timeout_secs: u64,
    /// Row count at which the dense ANN index gets trained
    pub index_min_rows: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            dense_field_name: "dense".to_string(),
            sparse_field_name: "sparse".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            distance: DistanceMetric::Cosine,
            hnsw_m: HnswParams::default().m,
            hnsw_ef_construct: HnswParams::default().ef_construct,
            timeout_secs: DEFAULT_TIMEOUT_SECONDS,
            index_min_rows: 256,
        }
    }
}

impl StoreConfig {
    #[inline]
    pub fn schema_for(&self, name: &str) -> CollectionSchema {
        CollectionSchema {
            name: name.to_string(),
            dense_field_name: self.dense_field_name.clone(),
            sparse_field_name: self.sparse_field_name.clone(),
            dense_dim: self.embedding_dimension as usize,
            distance_metric: self.distance,
            index_params: HnswParams {
                m: self.hnsw_m,
                ef_construct: self.hnsw_ef_construct,
            },
        }
    }
}

/// What a stored point carries besides its vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Document { text: String, metadata: Metadata },
    Vocabulary { vocabulary: Vocabulary },
}

/// Backend-neutral write unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePoint {
    pub id: Uuid,
    pub dense: DenseVector,
    pub sparse: SparseRow,
    pub payload: Payload,
}

impl StoragePoint {
    #[inline]
    pub fn from_record(record: &HybridRecord) -> Self {
        Self {
            id: record.id(),
            dense: record.dense_vector().to_vec(),
            sparse: record.sparse_row().clone(),
            payload: Payload::Document {
                text: record.text().to_string(),
                metadata: record.metadata().clone(),
            },
        }
    }

    /// The sentinel point holding a collection's vocabulary
    #[inline]
    pub fn vocabulary_carrier(vocabulary: &Vocabulary, dense_dim: usize) -> Self {
        Self {
            id: VOCABULARY_RECORD_ID,
            dense: vec![0.0; dense_dim],
            sparse: SparseRow::default(),
            payload: Payload::Vocabulary {
                vocabulary: vocabulary.clone(),
            },
        }
    }
}

/// Acknowledgement returned by a backend for a batched write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// Accepted durably, may not be visible yet
    Acknowledged,
    /// Fully applied
    Completed,
    /// Only part of the batch was applied
    Partial { applied: usize, submitted: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("collection '{0}' already exists")]
    DuplicateCollection(String),
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected the request: {0}")]
    Rejected(String),
}

/// Connection to a backing vector database.
///
/// Implementations are shared behind an `Arc` for the life of the process.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Create a collection. When it already exists, either succeed without
    /// touching it or answer [`StoreError::DuplicateCollection`].
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<StoragePoint>,
    ) -> Result<WriteAck, StoreError>;

    async fn retrieve_point(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<StoragePoint>, StoreError>;

    async fn count_points(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Collection names double as table and directory names.
#[inline]
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(IndexError::InvalidInput(format!(
            "collection name must be 1-{} characters, got {}",
            MAX_COLLECTION_NAME_LEN,
            name.len()
        )));
    }
    if name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(IndexError::InvalidInput(format!(
            "invalid collection name '{}': use letters, digits, '_', '-' or '.' and do not start with '.'",
            name
        )));
    }
    Ok(())
}

/// Adapter between hybrid records and a [`StoreClient`].
#[derive(Clone)]
pub struct VectorStore {
    client: Arc<dyn StoreClient>,
    config: StoreConfig,
    timeout: Duration,
}

impl fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("config", &self.config)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    #[inline]
    pub fn new(client: Arc<dyn StoreClient>, config: StoreConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            client,
            config,
            timeout,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline]
    pub fn schema_for(&self, name: &str) -> CollectionSchema {
        self.config.schema_for(name)
    }

    /// Make sure `name` exists, creating it with `schema` if it does not.
    ///
    /// An existing collection is accepted as is; its schema is not compared.
    /// Losing a creation race counts as success.
    #[inline]
    pub async fn ensure_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        validate_collection_name(name)?;

        let exists = self
            .bounded(name, "collection lookup", self.client.collection_exists(name))
            .await?
            .map_err(|e| Self::unavailable(name, &e))?;
        if exists {
            debug!("Collection '{}' already exists", name);
            return Ok(());
        }

        let schema = CollectionSchema {
            name: name.to_string(),
            ..schema.clone()
        };

        match self
            .bounded(name, "collection creation", self.client.create_collection(&schema))
            .await?
        {
            Ok(()) => {
                info!(
                    "Created collection '{}' ({} dims, {}, HNSW m={} ef_construct={})",
                    name,
                    schema.dense_dim,
                    schema.distance_metric,
                    schema.index_params.m,
                    schema.index_params.ef_construct
                );
                Ok(())
            }
            Err(StoreError::DuplicateCollection(_)) => {
                debug!("Collection '{}' was created concurrently", name);
                Ok(())
            }
            Err(e) => {
                // A losing concurrent creator may see any error, not just a duplicate
                let now_exists = self
                    .bounded(name, "collection lookup", self.client.collection_exists(name))
                    .await?
                    .unwrap_or(false);
                if now_exists {
                    warn!(
                        "Creating collection '{}' failed ({}) but it now exists",
                        name, e
                    );
                    return Ok(());
                }
                match e {
                    StoreError::Unavailable(reason) => Err(IndexError::StoreUnavailable {
                        collection: name.to_string(),
                        reason,
                    }),
                    other => Err(IndexError::StoreWriteFailure {
                        collection: name.to_string(),
                        batch_size: 0,
                        reason: format!("Failed to create collection: {}", other),
                    }),
                }
            }
        }
    }

    /// Write `records` plus the vocabulary carrier as one batch.
    ///
    /// Returns the number of document records written. Every check runs before
    /// the store is contacted.
    #[inline]
    pub async fn upsert(
        &self,
        records: &[HybridRecord],
        vocabulary: &Vocabulary,
        collection: &str,
    ) -> Result<usize> {
        self.validate_batch(records, vocabulary)?;
        validate_collection_name(collection)?;

        let schema = self.schema_for(collection);
        self.ensure_collection(collection, &schema).await?;

        let mut points = Vec::with_capacity(records.len() + 1);
        points.push(StoragePoint::vocabulary_carrier(vocabulary, schema.dense_dim));
        points.extend(records.iter().map(StoragePoint::from_record));
        let batch_size = points.len();

        debug!(
            "Upserting {} records and vocabulary ({} terms) into '{}'",
            records.len(),
            vocabulary.len(),
            collection
        );

        let ack = self
            .bounded(collection, "upsert", self.client.upsert_points(collection, points))
            .await?
            .map_err(|e| match e {
                StoreError::Unavailable(reason) => IndexError::StoreUnavailable {
                    collection: collection.to_string(),
                    reason,
                },
                other => IndexError::StoreWriteFailure {
                    collection: collection.to_string(),
                    batch_size,
                    reason: other.to_string(),
                },
            })?;

        match ack {
            WriteAck::Acknowledged | WriteAck::Completed => {
                info!(
                    "Upserted {} records into collection '{}'",
                    records.len(),
                    collection
                );
                Ok(records.len())
            }
            WriteAck::Partial { applied, submitted } => Err(IndexError::StoreWriteFailure {
                collection: collection.to_string(),
                batch_size,
                reason: format!("store applied only {} of {} points", applied, submitted),
            }),
        }
    }

    /// Fetch a stored point by id; `None` if the collection or point is missing.
    #[inline]
    pub async fn retrieve(&self, collection: &str, id: Uuid) -> Result<Option<StoragePoint>> {
        validate_collection_name(collection)?;
        match self
            .bounded(collection, "retrieve", self.client.retrieve_point(collection, id))
            .await?
        {
            Ok(point) => Ok(point),
            Err(StoreError::CollectionNotFound(_)) => Ok(None),
            Err(e) => Err(Self::unavailable(collection, &e)),
        }
    }

    /// The vocabulary stored in the collection's carrier record
    #[inline]
    pub async fn vocabulary(&self, collection: &str) -> Result<Option<Vocabulary>> {
        let carrier = self.retrieve(collection, VOCABULARY_RECORD_ID).await?;
        Ok(carrier.and_then(|point| match point.payload {
            Payload::Vocabulary { vocabulary } => Some(vocabulary),
            Payload::Document { .. } => None,
        }))
    }

    /// Number of stored points, vocabulary carrier included
    #[inline]
    pub async fn count(&self, collection: &str) -> Result<usize> {
        validate_collection_name(collection)?;
        self.bounded(collection, "count", self.client.count_points(collection))
            .await?
            .map_err(|e| match e {
                StoreError::CollectionNotFound(name) => {
                    IndexError::InvalidInput(format!("collection '{}' does not exist", name))
                }
                other => Self::unavailable(collection, &other),
            })
    }

    fn validate_batch(&self, records: &[HybridRecord], vocabulary: &Vocabulary) -> Result<()> {
        if records.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let expected = self.config.embedding_dimension as usize;
        if let Some((index, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.dense_vector().len() != expected)
        {
            return Err(ValidationError::DenseDimMismatch {
                index,
                expected,
                actual: record.dense_vector().len(),
            }
            .into());
        }

        let max_column = records
            .iter()
            .filter_map(|r| r.sparse_row().max_index())
            .max();
        if let Some(column) = max_column {
            if column as usize >= vocabulary.len() {
                return Err(ValidationError::SparseShapeMismatch {
                    expected: (records.len(), vocabulary.len()),
                    actual: (records.len(), column as usize + 1),
                }
                .into());
            }
        }

        validate_ids(records.iter().map(HybridRecord::id))?;
        Ok(())
    }

    /// Run a store call under the configured timeout.
    async fn bounded<T, F>(
        &self,
        collection: &str,
        operation: &str,
        call: F,
    ) -> Result<std::result::Result<T, StoreError>>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| IndexError::StoreUnavailable {
                collection: collection.to_string(),
                reason: format!("{} timed out after {:?}", operation, self.timeout),
            })
    }

    fn unavailable(collection: &str, error: &StoreError) -> IndexError {
        IndexError::StoreUnavailable {
            collection: collection.to_string(),
            reason: error.to_string(),
        }
    }
}
