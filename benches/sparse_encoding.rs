use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hybrid_index::sparse::{Normalization, SparseConfig, SparseEncoder};
use std::hint::black_box;

const WORDS: &[&str] = &[
    "vector", "database", "stores", "embeddings", "semantic", "search", "ranking", "documents",
    "frequency", "inverse", "lexical", "hybrid", "retrieval", "queries", "matching", "collections",
    "indexing", "chunks", "metadata", "payload", "sparse", "dense", "scoring", "terms",
];

fn corpus(documents: usize, words_per_document: usize) -> Vec<String> {
    (0..documents)
        .map(|d| {
            (0..words_per_document)
                .map(|w| WORDS[(d * 7 + w * 13) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let texts = corpus(500, 120);

    let mut group = c.benchmark_group("sparse_encode");
    for normalization in [Normalization::Lemmatize, Normalization::Stem] {
        let encoder = SparseEncoder::new(SparseConfig {
            normalization,
            ..SparseConfig::default()
        });
        group.bench_with_input(
            BenchmarkId::from_parameter(normalization),
            &texts,
            |b, texts| b.iter(|| encoder.encode(black_box(texts.as_slice()))),
        );
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
