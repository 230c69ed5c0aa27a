#[cfg(test)]
mod tests;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, ListArray, RecordBatch,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::index::Index;
use lancedb::index::vector::IvfHnswSqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    CollectionSchema, DistanceMetric, HnswParams, Payload, StoreClient, StoreError, StoragePoint,
    WriteAck,
};
use crate::config::Config;
use crate::records::Metadata;
use crate::sparse::{SparseRow, Vocabulary};
use crate::{IndexError, Result};

const ID_COLUMN: &str = "id";
const TEXT_COLUMN: &str = "text";
const METADATA_COLUMN: &str = "metadata";
const VOCABULARY_COLUMN: &str = "vocabulary";

const META_DENSE_FIELD: &str = "hybrid.dense_field";
const META_SPARSE_FIELD: &str = "hybrid.sparse_field";
const META_DISTANCE: &str = "hybrid.distance";
const META_HNSW_M: &str = "hybrid.hnsw_m";
const META_HNSW_EF: &str = "hybrid.hnsw_ef_construct";

/// [`StoreClient`] over an embedded LanceDB database; one table per collection.
///
/// Sparse rows are stored as two list columns, `<sparse>_indices` and
/// `<sparse>_values`. The dense ANN index is trained once a table holds
/// `index_min_rows` rows.
pub struct LanceClient {
    uri: String,
    connection: OnceCell<Connection>,
    index_min_rows: usize,
}

impl std::fmt::Debug for LanceClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceClient")
            .field("uri", &self.uri)
            .field("connected", &self.connection.initialized())
            .field("index_min_rows", &self.index_min_rows)
            .finish()
    }
}

impl LanceClient {
    /// Client for `uri`; nothing is opened until the first call.
    #[inline]
    pub fn new(uri: impl Into<String>, index_min_rows: usize) -> Self {
        Self {
            uri: uri.into(),
            connection: OnceCell::new(),
            index_min_rows,
        }
    }

    /// Client for a local database directory, created if missing.
    #[inline]
    pub fn at_path(path: &Path, index_min_rows: usize) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            IndexError::Config(format!(
                "Failed to create vector database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(
            format!("file://{}", path.display()),
            index_min_rows,
        ))
    }

    /// Client for the configured URI, or `<base_dir>/vectors`.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.store.uri {
            Some(uri) => Ok(Self::new(uri.clone(), config.store.index_min_rows)),
            None => Self::at_path(&config.vector_database_path(), config.store.index_min_rows),
        }
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Columns of `collection` that carry an index
    #[inline]
    pub async fn indexed_columns(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let table = self.open_table(collection).await?;
        let indices = table
            .list_indices()
            .await
            .map_err(|e| map_lance_error(collection, e))?;
        Ok(indices
            .into_iter()
            .flat_map(|index| index.columns)
            .collect())
    }

    async fn connection(&self) -> Result<&Connection, StoreError> {
        self.connection
            .get_or_try_init(|| async {
                debug!("Connecting to LanceDB at {}", self.uri);
                lancedb::connect(&self.uri)
                    .execute()
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("Failed to connect to LanceDB: {}", e)))
            })
            .await
    }

    async fn open_table(&self, name: &str) -> Result<Table, StoreError> {
        self.connection()
            .await?
            .open_table(name)
            .execute()
            .await
            .map_err(|e| map_lance_error(name, e))
    }

    /// Train the dense index once the table is large enough. Failures only
    /// cost search speed, so they are logged and swallowed.
    async fn maybe_build_index(&self, table: &Table, schema: &SchemaRef) {
        let Some(layout) = TableLayout::from_schema(schema) else {
            return;
        };

        let rows = match table.count_rows(None).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not count rows in '{}': {}", table.name(), e);
                return;
            }
        };
        if rows < self.index_min_rows {
            return;
        }

        match table.list_indices().await {
            Ok(indices) => {
                if indices
                    .iter()
                    .any(|index| index.columns.iter().any(|c| *c == layout.dense_field))
                {
                    return;
                }
            }
            Err(e) => {
                warn!("Could not list indices of '{}': {}", table.name(), e);
                return;
            }
        }

        let builder = IvfHnswSqIndexBuilder::default()
            .distance_type(lance_distance(layout.distance))
            .num_edges(layout.hnsw.m)
            .ef_construction(layout.hnsw.ef_construct);

        match table
            .create_index(&[layout.dense_field.as_str()], Index::IvfHnswSq(builder))
            .execute()
            .await
        {
            Ok(()) => info!(
                "Built HNSW index on '{}'.{} ({} rows)",
                table.name(),
                layout.dense_field,
                rows
            ),
            Err(e) => warn!("Failed to build dense index on '{}': {}", table.name(), e),
        }
    }
}

#[async_trait]
impl StoreClient for LanceClient {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        let names = self
            .connection()
            .await?
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to list tables: {}", e)))?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let arrow_schema = arrow_schema(schema);
        self.connection()
            .await?
            .create_empty_table(&schema.name, arrow_schema)
            .mode(CreateTableMode::exist_ok(|request| request))
            .execute()
            .await
            .map_err(|e| map_lance_error(&schema.name, e))?;
        debug!("Created LanceDB table '{}'", schema.name);
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<StoragePoint>,
    ) -> Result<WriteAck, StoreError> {
        let table = self.open_table(collection).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| map_lance_error(collection, e))?;

        let batch = record_batch(&schema, &points)?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema.clone());

        let mut merge = table.merge_insert(&[ID_COLUMN]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| map_lance_error(collection, e))?;

        debug!("Merged {} points into '{}'", points.len(), collection);
        self.maybe_build_index(&table, &schema).await;
        Ok(WriteAck::Completed)
    }

    async fn retrieve_point(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<StoragePoint>, StoreError> {
        let table = self.open_table(collection).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| map_lance_error(collection, e))?;

        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("{} = '{}'", ID_COLUMN, id))
            .limit(1)
            .execute()
            .await
            .map_err(|e| map_lance_error(collection, e))?
            .try_collect()
            .await
            .map_err(|e| map_lance_error(collection, e))?;

        for batch in &batches {
            if batch.num_rows() > 0 {
                return read_point(&schema, batch, 0).map(Some);
            }
        }
        Ok(None)
    }

    async fn count_points(&self, collection: &str) -> Result<usize, StoreError> {
        let table = self.open_table(collection).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| map_lance_error(collection, e))
    }
}

/// Field names and index settings recorded in the table's schema metadata
#[derive(Debug, Clone, PartialEq)]
struct TableLayout {
    dense_field: String,
    sparse_field: String,
    distance: DistanceMetric,
    hnsw: HnswParams,
}

impl TableLayout {
    fn from_schema(schema: &Schema) -> Option<Self> {
        let metadata = schema.metadata();
        let distance = match metadata.get(META_DISTANCE).map(String::as_str) {
            Some("dot") => DistanceMetric::Dot,
            Some("euclid") => DistanceMetric::Euclid,
            _ => DistanceMetric::Cosine,
        };
        let defaults = HnswParams::default();
        Some(Self {
            dense_field: metadata.get(META_DENSE_FIELD)?.clone(),
            sparse_field: metadata.get(META_SPARSE_FIELD)?.clone(),
            distance,
            hnsw: HnswParams {
                m: parse_or(metadata.get(META_HNSW_M), defaults.m),
                ef_construct: parse_or(metadata.get(META_HNSW_EF), defaults.ef_construct),
            },
        })
    }

    fn indices_column(&self) -> String {
        format!("{}_indices", self.sparse_field)
    }

    fn values_column(&self) -> String {
        format!("{}_values", self.sparse_field)
    }
}

fn parse_or(value: Option<&String>, default: u32) -> u32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn lance_distance(metric: DistanceMetric) -> lancedb::DistanceType {
    match metric {
        DistanceMetric::Cosine => lancedb::DistanceType::Cosine,
        DistanceMetric::Dot => lancedb::DistanceType::Dot,
        DistanceMetric::Euclid => lancedb::DistanceType::L2,
    }
}

fn map_lance_error(collection: &str, error: lancedb::Error) -> StoreError {
    match error {
        lancedb::Error::TableAlreadyExists { .. } => {
            StoreError::DuplicateCollection(collection.to_string())
        }
        lancedb::Error::TableNotFound { .. } => {
            StoreError::CollectionNotFound(collection.to_string())
        }
        lancedb::Error::InvalidInput { .. }
        | lancedb::Error::InvalidTableName { .. }
        | lancedb::Error::Schema { .. }
        | lancedb::Error::Arrow { .. } => StoreError::Rejected(error.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Arrow schema for a new collection table
pub(crate) fn arrow_schema(schema: &CollectionSchema) -> SchemaRef {
    let metadata = HashMap::from([
        (META_DENSE_FIELD.to_string(), schema.dense_field_name.clone()),
        (META_SPARSE_FIELD.to_string(), schema.sparse_field_name.clone()),
        (META_DISTANCE.to_string(), schema.distance_metric.to_string()),
        (META_HNSW_M.to_string(), schema.index_params.m.to_string()),
        (
            META_HNSW_EF.to_string(),
            schema.index_params.ef_construct.to_string(),
        ),
    ]);

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new(ID_COLUMN, DataType::Utf8, false),
            Field::new(
                schema.dense_field_name.as_str(),
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    schema.dense_dim as i32,
                ),
                false,
            ),
            Field::new(
                format!("{}_indices", schema.sparse_field_name),
                DataType::List(Arc::new(Field::new("item", DataType::UInt32, false))),
                false,
            ),
            Field::new(
                format!("{}_values", schema.sparse_field_name),
                DataType::List(Arc::new(Field::new("item", DataType::Float32, false))),
                false,
            ),
            Field::new(TEXT_COLUMN, DataType::Utf8, true),
            Field::new(METADATA_COLUMN, DataType::Utf8, true),
            Field::new(VOCABULARY_COLUMN, DataType::Utf8, true),
        ],
        metadata,
    ))
}

fn layout_of(schema: &Schema) -> Result<TableLayout, StoreError> {
    TableLayout::from_schema(schema).ok_or_else(|| {
        StoreError::Rejected("table was not created as a hybrid collection".to_string())
    })
}

fn item_field(schema: &Schema, column: &str) -> Result<(FieldRef, Option<i32>), StoreError> {
    let field = schema
        .field_with_name(column)
        .map_err(|e| StoreError::Rejected(e.to_string()))?;
    match field.data_type() {
        DataType::FixedSizeList(item, size) => Ok((item.clone(), Some(*size))),
        DataType::List(item) => Ok((item.clone(), None)),
        other => Err(StoreError::Rejected(format!(
            "column '{}' has unexpected type {}",
            column, other
        ))),
    }
}

/// Lay points out as one record batch matching the table schema.
pub(crate) fn record_batch(
    schema: &SchemaRef,
    points: &[StoragePoint],
) -> Result<RecordBatch, StoreError> {
    let layout = layout_of(schema)?;
    let (dense_item, dense_dim) = item_field(schema, &layout.dense_field)?;
    let dim = dense_dim.unwrap_or_default();
    let (indices_item, _) = item_field(schema, &layout.indices_column())?;
    let (values_item, _) = item_field(schema, &layout.values_column())?;

    let mut ids = Vec::with_capacity(points.len());
    let mut dense = Vec::with_capacity(points.len() * dim as usize);
    let mut sparse_indices = Vec::new();
    let mut sparse_values = Vec::new();
    let mut sparse_lengths = Vec::with_capacity(points.len());
    let mut texts = Vec::with_capacity(points.len());
    let mut metadata = Vec::with_capacity(points.len());
    let mut vocabularies = Vec::with_capacity(points.len());

    for point in points {
        if point.dense.len() != dim as usize {
            return Err(StoreError::Rejected(format!(
                "point {} has {} dimensions, collection expects {}",
                point.id,
                point.dense.len(),
                dim
            )));
        }
        ids.push(point.id.to_string());
        dense.extend_from_slice(&point.dense);
        sparse_indices.extend_from_slice(&point.sparse.indices);
        sparse_values.extend_from_slice(&point.sparse.values);
        sparse_lengths.push(point.sparse.len());

        match &point.payload {
            Payload::Document {
                text,
                metadata: meta,
            } => {
                texts.push(Some(text.clone()));
                metadata.push(Some(to_json(meta)?));
                vocabularies.push(None);
            }
            Payload::Vocabulary { vocabulary } => {
                texts.push(None);
                metadata.push(None);
                vocabularies.push(Some(to_json(vocabulary)?));
            }
        }
    }

    let dense_array = FixedSizeListArray::try_new(
        dense_item,
        dim,
        Arc::new(Float32Array::from(dense)),
        None,
    )
    .map_err(|e| StoreError::Rejected(format!("Failed to create dense array: {}", e)))?;

    let indices_array = ListArray::try_new(
        indices_item,
        OffsetBuffer::from_lengths(sparse_lengths.iter().copied()),
        Arc::new(UInt32Array::from(sparse_indices)),
        None,
    )
    .map_err(|e| StoreError::Rejected(format!("Failed to create sparse indices: {}", e)))?;

    let values_array = ListArray::try_new(
        values_item,
        OffsetBuffer::from_lengths(sparse_lengths),
        Arc::new(Float32Array::from(sparse_values)),
        None,
    )
    .map_err(|e| StoreError::Rejected(format!("Failed to create sparse values: {}", e)))?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(dense_array),
        Arc::new(indices_array),
        Arc::new(values_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(metadata)),
        Arc::new(StringArray::from(vocabularies)),
    ];

    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| StoreError::Rejected(format!("Failed to create record batch: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::Rejected(format!("Failed to serialize payload: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Rejected(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::Rejected(format!("Invalid {} column type", name)))
}

/// Rebuild the point stored at `row`.
pub(crate) fn read_point(
    schema: &Schema,
    batch: &RecordBatch,
    row: usize,
) -> Result<StoragePoint, StoreError> {
    let layout = layout_of(schema)?;
    let ids = column::<StringArray>(batch, ID_COLUMN)?;
    let dense = column::<FixedSizeListArray>(batch, &layout.dense_field)?;
    let indices_column = layout.indices_column();
    let values_column = layout.values_column();
    let sparse_indices = column::<ListArray>(batch, &indices_column)?;
    let sparse_values = column::<ListArray>(batch, &values_column)?;
    let texts = column::<StringArray>(batch, TEXT_COLUMN)?;
    let metadata = column::<StringArray>(batch, METADATA_COLUMN)?;
    let vocabularies = column::<StringArray>(batch, VOCABULARY_COLUMN)?;

    let id = Uuid::parse_str(ids.value(row))
        .map_err(|e| StoreError::Rejected(format!("Invalid point id: {}", e)))?;

    let dense_values = dense.value(row);
    let dense_vector = dense_values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| StoreError::Rejected("Invalid dense item type".to_string()))?
        .values()
        .to_vec();

    let indices = {
        let values = sparse_indices.value(row);
        values
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| StoreError::Rejected("Invalid sparse index type".to_string()))?
            .values()
            .to_vec()
    };
    let weights = {
        let values = sparse_values.value(row);
        values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| StoreError::Rejected("Invalid sparse value type".to_string()))?
            .values()
            .to_vec()
    };

    let payload = if vocabularies.is_null(row) {
        let meta: Metadata = if metadata.is_null(row) {
            Metadata::new()
        } else {
            serde_json::from_str(metadata.value(row))
                .map_err(|e| StoreError::Rejected(format!("Invalid metadata JSON: {}", e)))?
        };
        Payload::Document {
            text: if texts.is_null(row) {
                String::new()
            } else {
                texts.value(row).to_string()
            },
            metadata: meta,
        }
    } else {
        let vocabulary: Vocabulary = serde_json::from_str(vocabularies.value(row))
            .map_err(|e| StoreError::Rejected(format!("Invalid vocabulary JSON: {}", e)))?;
        Payload::Vocabulary { vocabulary }
    };

    Ok(StoragePoint {
        id,
        dense: dense_vector,
        sparse: SparseRow::new(indices, weights),
        payload,
    })
}
