#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Integration tests for the vector-store adapter over an embedded LanceDB
use hybrid_index::config::Config;
use hybrid_index::records::{DocumentChunk, HybridRecord, VOCABULARY_RECORD_ID, build};
use hybrid_index::sparse::{SparseConfig, SparseEncoder, Vocabulary};
use hybrid_index::store::{LanceClient, Payload, StoreClient, StoreConfig, VectorStore};
use hybrid_index::{IndexError, ValidationError};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 16;

fn create_test_store(index_min_rows: usize) -> (VectorStore, TempDir) {
    let (store, _client, temp_dir) = create_test_store_with_client(index_min_rows);
    (store, temp_dir)
}

fn create_test_store_with_client(
    index_min_rows: usize,
) -> (VectorStore, Arc<LanceClient>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.store = StoreConfig {
        embedding_dimension: DIM as u32,
        index_min_rows,
        ..StoreConfig::default()
    };
    let client =
        Arc::new(LanceClient::from_config(&config).expect("should create LanceDB client"));
    (
        VectorStore::new(client.clone(), config.store.clone()),
        client,
        temp_dir,
    )
}

fn realistic_vector(seed: usize) -> Vec<f32> {
    (0..DIM)
        .map(|i| ((i * 31 + seed * 17) as f32).mul_add(0.01, 0.5).sin() * 0.1)
        .collect()
}

fn create_records(texts: &[&str]) -> (Vec<HybridRecord>, Vocabulary) {
    let chunks: Vec<DocumentChunk> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            DocumentChunk::new(*text)
                .with_metadata("title", format!("Chapter {}", i + 1))
                .with_metadata("page", i as i64 + 1)
                .with_metadata("draft", false)
        })
        .collect();
    let (matrix, vocabulary) = SparseEncoder::new(SparseConfig::default())
        .encode(texts)
        .expect("should encode texts");
    let dense = (0..texts.len()).map(realistic_vector).collect();
    let records = build(chunks, dense, &matrix, &vocabulary, DIM).expect("should build records");
    (records, vocabulary)
}

const DOCUMENTS: &[&str] = &[
    "Ownership is Rust's most unique feature and has deep implications for the rest of the language.",
    "References allow you to refer to some value without taking ownership of it.",
    "Slices let you reference a contiguous sequence of elements in a collection.",
    "Structs let you create custom types that group related values together.",
];

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let (store, _temp_dir) = create_test_store(256);
    let schema = store.schema_for("book");

    for _ in 0..3 {
        store
            .ensure_collection("book", &schema)
            .await
            .expect("ensure should succeed");
    }

    assert_eq!(store.count("book").await.expect("should count"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ensure_collection_creates_one_table() {
    let (store, client, _temp_dir) = create_test_store_with_client(256);
    let schema = store.schema_for("shared");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let schema = schema.clone();
            tokio::spawn(async move { store.ensure_collection("shared", &schema).await })
        })
        .collect();

    for handle in handles {
        handle
            .await
            .expect("task should not panic")
            .expect("every caller should succeed");
    }

    assert!(
        client
            .collection_exists("shared")
            .await
            .expect("should list tables")
    );
    assert_eq!(store.count("shared").await.expect("should count"), 0);
}

#[tokio::test]
async fn upsert_and_fetch_round_trip() {
    let (store, _temp_dir) = create_test_store(256);
    let (records, vocabulary) = create_records(DOCUMENTS);

    let written = store
        .upsert(&records, &vocabulary, "book")
        .await
        .expect("upsert should succeed");
    assert_eq!(written, DOCUMENTS.len());
    assert_eq!(
        store.count("book").await.expect("should count"),
        DOCUMENTS.len() + 1
    );

    for record in &records {
        let point = store
            .retrieve("book", record.id())
            .await
            .expect("should retrieve")
            .expect("record should be stored");
        assert_eq!(point.dense, record.dense_vector());
        assert_eq!(&point.sparse, record.sparse_row());
        match point.payload {
            Payload::Document { text, metadata } => {
                assert_eq!(text, record.text());
                assert_eq!(&metadata, record.metadata());
            }
            Payload::Vocabulary { .. } => panic!("expected a document payload"),
        }
    }

    let stored_vocabulary = store
        .vocabulary("book")
        .await
        .expect("should read vocabulary")
        .expect("vocabulary should be stored");
    assert_eq!(stored_vocabulary, vocabulary);
}

#[tokio::test]
async fn reingesting_overwrites_points() {
    let (store, _temp_dir) = create_test_store(256);
    let (records, vocabulary) = create_records(DOCUMENTS);

    store
        .upsert(&records, &vocabulary, "book")
        .await
        .expect("first upsert should succeed");
    store
        .upsert(&records, &vocabulary, "book")
        .await
        .expect("second upsert should succeed");

    assert_eq!(
        store.count("book").await.expect("should count"),
        DOCUMENTS.len() + 1
    );
}

#[tokio::test]
async fn validation_failures_create_nothing() {
    let (store, _temp_dir) = create_test_store(256);
    let (records, _) = create_records(DOCUMENTS);

    let result = store.upsert(&records, &Vocabulary::new(), "book").await;

    assert!(matches!(
        result,
        Err(IndexError::Validation(
            ValidationError::SparseShapeMismatch { .. }
        ))
    ));
    assert!(matches!(
        store.count("book").await,
        Err(IndexError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn dense_index_waits_for_threshold() {
    let (store, client, _temp_dir) = create_test_store_with_client(256);
    let (records, vocabulary) = create_records(DOCUMENTS);

    store
        .upsert(&records, &vocabulary, "small")
        .await
        .expect("upsert should succeed");

    let indexed = client
        .indexed_columns("small")
        .await
        .expect("should list indices");
    assert!(indexed.is_empty(), "unexpected indices: {:?}", indexed);
}

#[tokio::test]
async fn dense_index_builds_once_threshold_is_reached() {
    let (store, client, _temp_dir) = create_test_store_with_client(4);
    let texts: Vec<String> = (0..300)
        .map(|i| format!("document number {} about {}", i, DOCUMENTS[i % DOCUMENTS.len()]))
        .collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let (records, vocabulary) = create_records(&refs);

    store
        .upsert(&records, &vocabulary, "large")
        .await
        .expect("upsert should succeed");

    assert_eq!(store.count("large").await.expect("should count"), 301);
    let indexed = client
        .indexed_columns("large")
        .await
        .expect("should list indices");
    assert!(
        indexed.iter().any(|column| column == "dense"),
        "dense column should be indexed, found {:?}",
        indexed
    );

    let carrier = store
        .retrieve("large", VOCABULARY_RECORD_ID)
        .await
        .expect("should retrieve")
        .expect("carrier should exist");
    assert!(carrier.sparse.is_empty());
    assert!(carrier.dense.iter().all(|v| *v == 0.0));

    // A second batch leaves the existing index in place
    let (more, more_vocabulary) = create_records(DOCUMENTS);
    store
        .upsert(&more, &more_vocabulary, "large")
        .await
        .expect("upsert into an indexed table should succeed");
    assert_eq!(
        store.count("large").await.expect("should count"),
        301 + DOCUMENTS.len()
    );
}
