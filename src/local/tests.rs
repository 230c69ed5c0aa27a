use super::*;
use crate::sparse::SparseEncoder;
use tempfile::TempDir;

fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| DocumentChunk::new(*t).with_metadata("chunk", i as i64))
        .collect()
}

fn index(collection: &str, texts: &[&str]) -> LocalIndex {
    let config = SparseConfig::default();
    let (matrix, vocabulary) = SparseEncoder::new(config.clone())
        .encode(texts)
        .expect("should encode texts");
    LocalIndex::from_chunks(collection, &chunks(texts), &matrix, &vocabulary, &config)
        .expect("should build local index")
}

#[test]
fn postings_invert_sparse_rows() {
    let index = index("c", &["rust ownership", "rust borrowing rules", ""]);

    assert_eq!(index.meta.num_docs, 3);
    assert_eq!(index.meta.vocab_size, index.vocabulary.len());
    assert_eq!(index.docs.len(), 3);
    assert_eq!(index.postings.len(), index.vocabulary.len());
    assert_eq!(index.postings["rust"].len(), 2);
    assert_eq!(index.postings["ownership"].len(), 1);
    assert!((index.meta.avg_doc_terms - 5.0 / 3.0).abs() < 1e-9);
}

#[test]
fn mismatched_matrix_is_rejected() {
    let texts = ["alpha beta", "gamma"];
    let (matrix, vocabulary) = SparseEncoder::new(SparseConfig::default())
        .encode(&texts)
        .expect("should encode texts");

    let mut short = Vocabulary::new();
    short.insert("alpha");
    let result = LocalIndex::from_chunks(
        "c",
        &chunks(&texts),
        &matrix,
        &short,
        &SparseConfig::default(),
    );
    assert!(matches!(
        result,
        Err(IndexError::Validation(
            ValidationError::SparseShapeMismatch { .. }
        ))
    ));

    let result = LocalIndex::from_chunks(
        "c",
        &chunks(&texts[..1]),
        &matrix,
        &vocabulary,
        &SparseConfig::default(),
    );
    assert!(matches!(
        result,
        Err(IndexError::Validation(
            ValidationError::SparseShapeMismatch { .. }
        ))
    ));
}

#[tokio::test]
async fn persist_writes_four_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = LocalIndexStore::new(temp_dir.path());

    store
        .persist("c", &index("c", &["the cat sat"]))
        .await
        .expect("should persist index");

    let dir = temp_dir.path().join("c");
    for file in [VOCABULARY_FILE, POSTINGS_FILE, DOCUMENTS_FILE, META_FILE] {
        assert!(dir.join(file).is_file(), "{} should exist", file);
    }

    let vocab_json = std::fs::read_to_string(dir.join(VOCABULARY_FILE)).expect("should read");
    let parsed: serde_json::Value = serde_json::from_str(&vocab_json).expect("valid json");
    assert_eq!(parsed["cat"], 0);
    assert_eq!(parsed["sat"], 1);
}

#[tokio::test]
async fn second_persist_overwrites_first() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = LocalIndexStore::new(temp_dir.path());
    let first = index("c", &["apples and oranges"]);
    let second = index("c", &["zebras", "giraffes grazing"]);

    store.persist("c", &first).await.expect("first persist");
    store.persist("c", &second).await.expect("second persist");

    let loaded = store.load("c").await.expect("should load index");
    assert_eq!(loaded, second);
    assert!(loaded.vocabulary.get("apple").is_none());
    assert!(!loaded.docs.contains_key(first.docs.keys().next().expect("one doc")));
}

#[tokio::test]
async fn load_missing_collection_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = LocalIndexStore::new(temp_dir.path());

    let result = store.load("absent").await;
    assert!(matches!(result, Err(IndexError::InvalidInput(_))));
}

#[tokio::test]
async fn invalid_collection_name_writes_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = LocalIndexStore::new(temp_dir.path().join("indexes"));

    let result = store.persist("../outside", &index("x", &["text"])).await;

    assert!(matches!(result, Err(IndexError::InvalidInput(_))));
    assert!(!temp_dir.path().join("indexes").exists());
}
