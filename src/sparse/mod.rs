// Sparse lexical encoding
// Turns a batch of texts into a BM25-weighted CSR matrix plus its vocabulary


pub mod matrix;
pub mod scoring;
pub mod tokenizer;

pub use matrix::{SparseMatrix, SparseMatrixError, SparseRow, Vocabulary, VocabularyError};
pub use scoring::{Bm25Method, Bm25Params};
pub use tokenizer::{Normalization, Tokenizer};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{IndexError, Result};

/// Sparse encoder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SparseConfig {
    pub normalization: Normalization,
    pub method: Bm25Method,
    /// IDF variant; falls back to `method` when unset
    pub idf_method: Option<Bm25Method>,
    pub k1: f64,
    pub b: f64,
    pub delta: f64,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            normalization: Normalization::Lemmatize,
            method: Bm25Method::Robertson,
            idf_method: None,
            k1: 1.5,
            b: 0.75,
            delta: 1.5,
        }
    }
}

impl SparseConfig {
    #[inline]
    pub fn params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
            delta: self.delta,
        }
    }

    #[inline]
    pub fn effective_idf_method(&self) -> Bm25Method {
        self.idf_method.unwrap_or(self.method)
    }
}

/// BM25 sparse encoder.
///
/// Each call to [`SparseEncoder::encode`] builds a fresh vocabulary from the
/// batch it is given; indices are only meaningful alongside that vocabulary.
#[derive(Debug)]
pub struct SparseEncoder {
    config: SparseConfig,
    tokenizer: Tokenizer,
}

impl SparseEncoder {
    #[inline]
    pub fn new(config: SparseConfig) -> Self {
        let tokenizer = Tokenizer::new(config.normalization);
        Self { config, tokenizer }
    }

    #[inline]
    pub fn config(&self) -> &SparseConfig {
        &self.config
    }

    /// Encode `texts` into a `(len(texts), len(vocabulary))` matrix.
    ///
    /// Empty texts produce empty rows. Fails with [`IndexError::InvalidInput`]
    /// when `texts` itself is empty.
    #[inline]
    pub fn encode<S: AsRef<str>>(&self, texts: &[S]) -> Result<(SparseMatrix, Vocabulary)> {
        if texts.is_empty() {
            return Err(IndexError::InvalidInput(
                "cannot sparse-encode an empty batch of texts".to_string(),
            ));
        }

        let mut vocabulary = Vocabulary::new();
        let mut term_counts: Vec<BTreeMap<u32, u32>> = Vec::with_capacity(texts.len());
        let mut doc_lengths: Vec<usize> = Vec::with_capacity(texts.len());

        for text in texts {
            let tokens = self.tokenizer.tokenize(text.as_ref());
            let mut counts = BTreeMap::new();
            for token in &tokens {
                *counts.entry(vocabulary.insert(token)).or_insert(0) += 1;
            }
            doc_lengths.push(tokens.len());
            term_counts.push(counts);
        }

        let mut doc_freqs = vec![0u32; vocabulary.len()];
        for counts in &term_counts {
            for &column in counts.keys() {
                doc_freqs[column as usize] += 1;
            }
        }

        let n = texts.len() as f64;
        let total_len: usize = doc_lengths.iter().sum();
        let avg_doc_len = if total_len == 0 {
            1.0
        } else {
            total_len as f64 / n
        };

        let idf_method = self.config.effective_idf_method();
        let idf: Vec<f64> = doc_freqs
            .iter()
            .map(|&df| scoring::idf(idf_method, f64::from(df), n))
            .collect();

        let params = self.config.params();
        let rows: Vec<SparseRow> = term_counts
            .iter()
            .zip(&doc_lengths)
            .map(|(counts, &doc_len)| {
                let (indices, values) = counts
                    .iter()
                    .map(|(&column, &tf)| {
                        let tfc = scoring::term_frequency_component(
                            self.config.method,
                            f64::from(tf),
                            doc_len as f64,
                            avg_doc_len,
                            params,
                        );
                        (column, (idf[column as usize] * tfc) as f32)
                    })
                    .unzip();
                SparseRow::new(indices, values)
            })
            .collect();

        let matrix = SparseMatrix::from_rows(rows, vocabulary.len())
            .map_err(|e| IndexError::InvalidInput(format!("Failed to assemble sparse matrix: {}", e)))?;

        debug!(
            "Sparse-encoded {} texts into {:?} matrix with {} entries ({}, {})",
            texts.len(),
            matrix.shape(),
            matrix.nnz(),
            self.config.method,
            self.config.normalization
        );

        Ok((matrix, vocabulary))
    }
}
