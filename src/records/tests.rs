use super::*;
use crate::sparse::{SparseConfig, SparseEncoder};

const DIM: usize = 4;

fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            DocumentChunk::new(*text)
                .with_metadata("title", format!("Doc {}", i))
                .with_metadata("page", i as i64)
        })
        .collect()
}

fn dense(count: usize, dim: usize) -> Vec<DenseVector> {
    (0..count)
        .map(|i| (0..dim).map(|j| (i * dim + j) as f32 * 0.1).collect())
        .collect()
}

fn encode(chunks: &[DocumentChunk]) -> (SparseMatrix, Vocabulary) {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    SparseEncoder::new(SparseConfig::default())
        .encode(&texts)
        .expect("should encode texts")
}

#[test]
fn builds_one_record_per_chunk_in_order() {
    let input = chunks(&["first chunk text", "second chunk text", "third"]);
    let ids: Vec<Uuid> = input.iter().map(|c| c.id).collect();
    let (matrix, vocabulary) = encode(&input);

    let records = build(input.clone(), dense(3, DIM), &matrix, &vocabulary, DIM)
        .expect("should build records");

    assert_eq!(records.len(), 3);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.id(), ids[i]);
        assert_eq!(record.text(), input[i].text);
        assert_eq!(record.metadata(), &input[i].metadata);
        assert_eq!(record.dense_vector().len(), DIM);
        assert_eq!(
            record.sparse_row(),
            &matrix.row(i).expect("row should exist")
        );
    }
}

#[test]
fn empty_batch_is_rejected() {
    let matrix = SparseMatrix::from_rows(Vec::new(), 0).expect("empty matrix");
    let result = build(Vec::new(), Vec::new(), &matrix, &Vocabulary::new(), DIM);

    assert_eq!(result, Err(ValidationError::EmptyBatch));
}

#[test]
fn dense_count_mismatch_produces_no_records() {
    let input = chunks(&["one", "two", "three"]);
    let (matrix, vocabulary) = encode(&input);

    let result = build(input, dense(2, DIM), &matrix, &vocabulary, DIM);

    assert_eq!(
        result,
        Err(ValidationError::DenseCountMismatch {
            expected: 3,
            actual: 2
        })
    );
}

#[test]
fn dense_dimension_mismatch_reports_index() {
    let input = chunks(&["alpha", "beta"]);
    let (matrix, vocabulary) = encode(&input);
    let mut vectors = dense(2, DIM);
    vectors[1].push(0.0);

    let result = build(input, vectors, &matrix, &vocabulary, DIM);

    assert_eq!(
        result,
        Err(ValidationError::DenseDimMismatch {
            index: 1,
            expected: DIM,
            actual: DIM + 1
        })
    );
}

#[test]
fn sparse_shape_mismatch_is_rejected() {
    let input = chunks(&["alpha beta", "gamma"]);
    let (matrix, _) = encode(&input);
    let mut vocabulary = Vocabulary::new();
    vocabulary.insert("alpha");

    let result = build(input, dense(2, DIM), &matrix, &vocabulary, DIM);

    assert_eq!(
        result,
        Err(ValidationError::SparseShapeMismatch {
            expected: (2, 1),
            actual: (2, 3)
        })
    );
}

#[test]
fn reserved_id_is_rejected() {
    let mut input = chunks(&["alpha", "beta"]);
    input[1].id = VOCABULARY_RECORD_ID;
    let (matrix, vocabulary) = encode(&input);

    let result = build(input, dense(2, DIM), &matrix, &vocabulary, DIM);

    assert_eq!(
        result,
        Err(ValidationError::ReservedId(VOCABULARY_RECORD_ID))
    );
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut input = chunks(&["alpha", "beta"]);
    input[1].id = input[0].id;
    let duplicate = input[0].id;
    let (matrix, vocabulary) = encode(&input);

    let result = build(input, dense(2, DIM), &matrix, &vocabulary, DIM);

    assert_eq!(result, Err(ValidationError::DuplicateId(duplicate)));
}

#[test]
fn chunk_title_falls_back_to_default() {
    let titled = DocumentChunk::new("text").with_metadata("title", "Guide");
    let untitled = DocumentChunk::new("text");
    let numeric = DocumentChunk::new("text").with_metadata("title", 7_i64);

    assert_eq!(titled.title(), "Guide");
    assert_eq!(untitled.title(), DEFAULT_TITLE);
    assert_eq!(numeric.title(), DEFAULT_TITLE);
}

#[test]
fn chunk_deserializes_from_json() {
    let json = r#"{
        "id": "6f1c2a9e-3d4b-4c5d-8e9f-0a1b2c3d4e5f",
        "text": "Rust ownership",
        "metadata": {"title": "Book", "page": 12, "score": 0.5, "draft": false}
    }"#;

    let chunk: DocumentChunk = serde_json::from_str(json).expect("should parse chunk");

    assert_eq!(chunk.metadata.get("title"), Some(&MetadataValue::from("Book")));
    assert_eq!(chunk.metadata.get("page"), Some(&MetadataValue::Integer(12)));
    assert_eq!(chunk.metadata.get("score"), Some(&MetadataValue::Float(0.5)));
    assert_eq!(chunk.metadata.get("draft"), Some(&MetadataValue::Bool(false)));
}

#[test]
fn metadata_is_optional_in_json() {
    let json = r#"{"id": "6f1c2a9e-3d4b-4c5d-8e9f-0a1b2c3d4e5f", "text": "bare"}"#;
    let chunk: DocumentChunk = serde_json::from_str(json).expect("should parse chunk");

    assert!(chunk.metadata.is_empty());
}
