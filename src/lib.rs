use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store write failed for collection '{collection}' ({batch_size} points): {reason}")]
    StoreWriteFailure {
        collection: String,
        batch_size: usize,
        reason: String,
    },

    #[error("Store unavailable for collection '{collection}': {reason}")]
    StoreUnavailable { collection: String, reason: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// HTTP-style status reported to the job/API layer
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::Validation(_) => 400,
            Self::StoreUnavailable { .. } => 503,
            Self::StoreWriteFailure { .. }
            | Self::Embedding(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => 500,
        }
    }
}

/// Shape and identity problems found before any I/O happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("batch contains no chunks")]
    EmptyBatch,

    #[error("expected {expected} dense vectors, got {actual}")]
    DenseCountMismatch { expected: usize, actual: usize },

    #[error("dense vector {index} has {actual} dimensions, expected {expected}")]
    DenseDimMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("sparse matrix shape {actual:?} does not match expected {expected:?}")]
    SparseShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("chunk id {0} is reserved for the vocabulary record")]
    ReservedId(Uuid),

    #[error("chunk id {0} appears more than once in the batch")]
    DuplicateId(Uuid),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod local;
pub mod records;
pub mod sparse;
pub mod store;
