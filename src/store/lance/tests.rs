use super::*;
use crate::records::{MetadataValue, VOCABULARY_RECORD_ID};
use crate::store::StoreConfig;
use tempfile::TempDir;

fn schema(dim: usize) -> CollectionSchema {
    StoreConfig {
        embedding_dimension: dim as u32,
        ..StoreConfig::default()
    }
    .schema_for("docs")
}

fn document(dim: usize, text: &str) -> StoragePoint {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), MetadataValue::from("Guide"));
    metadata.insert("page".to_string(), MetadataValue::Integer(3));
    StoragePoint {
        id: Uuid::new_v4(),
        dense: vec![0.25; dim],
        sparse: SparseRow::new(vec![0, 2], vec![0.5, 1.25]),
        payload: Payload::Document {
            text: text.to_string(),
            metadata,
        },
    }
}

fn vocabulary() -> Vocabulary {
    let mut vocabulary = Vocabulary::new();
    vocabulary.insert("rust");
    vocabulary.insert("ownership");
    vocabulary.insert("borrow");
    vocabulary
}

#[test]
fn arrow_schema_records_layout() {
    let arrow = arrow_schema(&schema(8));

    let names: Vec<&str> = arrow.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(
        names,
        vec![
            "id",
            "dense",
            "sparse_indices",
            "sparse_values",
            "text",
            "metadata",
            "vocabulary"
        ]
    );
    assert!(matches!(
        arrow.field_with_name("dense").expect("dense field").data_type(),
        DataType::FixedSizeList(_, 8)
    ));

    let layout = TableLayout::from_schema(&arrow).expect("layout should be recorded");
    assert_eq!(layout.dense_field, "dense");
    assert_eq!(layout.sparse_field, "sparse");
    assert_eq!(layout.distance, DistanceMetric::Cosine);
    assert_eq!(layout.hnsw, HnswParams { m: 32, ef_construct: 100 });
}

#[test]
fn custom_field_names_are_used() {
    let mut custom = schema(4);
    custom.dense_field_name = "embedding".to_string();
    custom.sparse_field_name = "bm25".to_string();
    custom.distance_metric = DistanceMetric::Dot;

    let arrow = arrow_schema(&custom);

    assert!(arrow.field_with_name("embedding").is_ok());
    assert!(arrow.field_with_name("bm25_indices").is_ok());
    assert!(arrow.field_with_name("bm25_values").is_ok());
    let layout = TableLayout::from_schema(&arrow).expect("layout should be recorded");
    assert_eq!(layout.distance, DistanceMetric::Dot);
}

#[test]
fn batch_round_trips_points() {
    let arrow = arrow_schema(&schema(4));
    let points = vec![
        StoragePoint::vocabulary_carrier(&vocabulary(), 4),
        document(4, "Rust ownership"),
    ];

    let batch = record_batch(&arrow, &points).expect("should build batch");
    assert_eq!(batch.num_rows(), 2);

    for (row, expected) in points.iter().enumerate() {
        let point = read_point(&arrow, &batch, row).expect("should read point");
        assert_eq!(&point, expected);
    }
}

#[test]
fn carrier_has_empty_sparse_row() {
    let arrow = arrow_schema(&schema(4));
    let carrier = StoragePoint::vocabulary_carrier(&vocabulary(), 4);
    let batch = record_batch(&arrow, &[carrier]).expect("should build batch");

    let point = read_point(&arrow, &batch, 0).expect("should read point");
    assert_eq!(point.id, VOCABULARY_RECORD_ID);
    assert!(point.sparse.is_empty());
    assert_eq!(point.dense, vec![0.0; 4]);
}

#[test]
fn wrong_dimension_is_rejected() {
    let arrow = arrow_schema(&schema(4));
    let result = record_batch(&arrow, &[document(3, "short")]);

    assert!(matches!(result, Err(StoreError::Rejected(_))));
}

#[test]
fn foreign_table_is_rejected() {
    let plain = Arc::new(Schema::new(vec![Field::new("id", DataType::Utf8, false)]));
    let result = record_batch(&plain, &[document(4, "text")]);

    assert!(matches!(result, Err(StoreError::Rejected(_))));
}

#[tokio::test]
async fn create_and_detect_collection() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let client = LanceClient::at_path(&temp_dir.path().join("vectors"), 256)
        .expect("should create client");

    assert!(!client.collection_exists("docs").await.expect("should list tables"));
    client
        .create_collection(&schema(4))
        .await
        .expect("should create collection");
    assert!(client.collection_exists("docs").await.expect("should list tables"));

    client
        .create_collection(&schema(4))
        .await
        .expect("creating an existing table opens it");
    assert_eq!(client.count_points("docs").await.expect("should count"), 0);
    assert_eq!(
        client.indexed_columns("docs").await.expect("should list indices"),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn upsert_retrieve_and_overwrite() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let client = LanceClient::at_path(temp_dir.path(), 256).expect("should create client");
    client
        .create_collection(&schema(4))
        .await
        .expect("should create collection");

    let doc = document(4, "first version");
    let ack = client
        .upsert_points(
            "docs",
            vec![StoragePoint::vocabulary_carrier(&vocabulary(), 4), doc.clone()],
        )
        .await
        .expect("should upsert points");
    assert_eq!(ack, WriteAck::Completed);
    assert_eq!(client.count_points("docs").await.expect("should count"), 2);

    let mut updated = doc.clone();
    updated.payload = Payload::Document {
        text: "second version".to_string(),
        metadata: Metadata::new(),
    };
    client
        .upsert_points("docs", vec![updated.clone()])
        .await
        .expect("should overwrite point");

    assert_eq!(client.count_points("docs").await.expect("should count"), 2);
    let stored = client
        .retrieve_point("docs", doc.id)
        .await
        .expect("should query point")
        .expect("point should exist");
    assert_eq!(stored, updated);

    let missing = client
        .retrieve_point("docs", Uuid::new_v4())
        .await
        .expect("should query point");
    assert!(missing.is_none());
}

#[tokio::test]
async fn missing_table_maps_to_not_found() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let client = LanceClient::at_path(temp_dir.path(), 256).expect("should create client");

    let result = client.count_points("absent").await;
    assert_eq!(result, Err(StoreError::CollectionNotFound("absent".to_string())));
}
