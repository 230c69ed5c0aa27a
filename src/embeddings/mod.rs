// Dense embeddings
// The DenseEncoder contract used during ingestion, plus an Ollama implementation


pub mod ollama;

pub use ollama::OllamaClient;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::records::DenseVector;

/// Which side of retrieval a text is encoded for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextType {
    #[default]
    Document,
    Query,
}

/// Produces one dense vector per input text.
///
/// Implementations may block; async callers should run them on a blocking
/// thread.
pub trait DenseEncoder: Send + Sync {
    /// Length of every vector this encoder returns
    fn dimension(&self) -> usize;

    fn dense_encode(
        &self,
        texts: &[String],
        titles: &[String],
        text_type: TextType,
    ) -> Result<Vec<DenseVector>>;
}

/// Apply the task prefix expected by nomic-style embedding models.
#[inline]
pub fn format_input(text: &str, title: &str, text_type: TextType) -> String {
    match text_type {
        TextType::Document => format!("search_document: {}\n\n{}", title, text),
        TextType::Query => format!("search_query: {}", text),
    }
}
