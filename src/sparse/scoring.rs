// BM25-family term weighting

use serde::{Deserialize, Serialize};
use std::fmt;

/// BM25 variant used for the term-frequency component and, unless
/// overridden, for the inverse document frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bm25Method {
    #[default]
    Robertson,
    Lucene,
    Atire,
    #[serde(rename = "bm25l")]
    Bm25L,
    #[serde(rename = "bm25+", alias = "bm25plus")]
    Bm25Plus,
}

impl fmt::Display for Bm25Method {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Robertson => "robertson",
            Self::Lucene => "lucene",
            Self::Atire => "atire",
            Self::Bm25L => "bm25l",
            Self::Bm25Plus => "bm25+",
        };
        f.write_str(name)
    }
}

/// Free parameters shared by all variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Lower bound added by BM25L and BM25+
    pub delta: f64,
}

/// Inverse document frequency of a term found in `df` of `n` documents.
#[inline]
pub fn idf(method: Bm25Method, df: f64, n: f64) -> f64 {
    match method {
        // Clamped so that very common terms never get negative weight
        Bm25Method::Robertson => ((n - df + 0.5) / (df + 0.5)).max(1.0).ln(),
        Bm25Method::Lucene => (1.0 + (n - df + 0.5) / (df + 0.5)).ln(),
        Bm25Method::Atire => (n / df).ln(),
        Bm25Method::Bm25L => ((n + 1.0) / (df + 0.5)).ln(),
        Bm25Method::Bm25Plus => ((n + 1.0) / df).ln(),
    }
}

/// Saturated term-frequency component for a document of length `doc_len`.
#[inline]
pub fn term_frequency_component(
    method: Bm25Method,
    tf: f64,
    doc_len: f64,
    avg_doc_len: f64,
    params: Bm25Params,
) -> f64 {
    let Bm25Params { k1, b, delta } = params;
    let length_norm = 1.0 - b + b * doc_len / avg_doc_len;

    match method {
        Bm25Method::Robertson | Bm25Method::Lucene => tf / k1.mul_add(length_norm, tf),
        Bm25Method::Atire => tf * (k1 + 1.0) / k1.mul_add(length_norm, tf),
        Bm25Method::Bm25L => {
            let c = tf / length_norm;
            (k1 + 1.0) * (c + delta) / (k1 + c + delta)
        }
        Bm25Method::Bm25Plus => (k1 + 1.0) * tf / k1.mul_add(length_norm, tf) + delta,
    }
}
