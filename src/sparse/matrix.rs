// Row-compressed sparse matrix and the vocabulary that names its columns

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Term to column mapping for one ingestion batch.
///
/// Indices are dense (`0..len`) and assigned in order of first insertion.
/// Serialized as a JSON object `{term: index}`; deserialization rejects
/// gaps and duplicate indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<String, u32>", try_from = "BTreeMap<String, u32>")]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("vocabulary indices must be dense: expected index {expected}, found {found} for term '{term}'")]
    NotDense {
        term: String,
        expected: u32,
        found: u32,
    },
}

impl Vocabulary {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the column for `term`, assigning the next free index if it is new.
    #[inline]
    pub fn insert(&mut self, term: &str) -> u32 {
        if let Some(&idx) = self.index.get(term) {
            return idx;
        }
        let idx = self.terms.len() as u32;
        self.terms.push(term.to_string());
        self.index.insert(term.to_string(), idx);
        idx
    }

    #[inline]
    pub fn get(&self, term: &str) -> Option<u32> {
        self.index.get(term).copied()
    }

    #[inline]
    pub fn term(&self, index: u32) -> Option<&str> {
        self.terms.get(index as usize).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate `(term, index)` pairs in index order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.as_str(), idx as u32))
    }
}

impl From<Vocabulary> for BTreeMap<String, u32> {
    #[inline]
    fn from(vocabulary: Vocabulary) -> Self {
        vocabulary.index.into_iter().collect()
    }
}

impl TryFrom<BTreeMap<String, u32>> for Vocabulary {
    type Error = VocabularyError;

    #[inline]
    fn try_from(map: BTreeMap<String, u32>) -> Result<Self, Self::Error> {
        let mut entries: Vec<(String, u32)> = map.into_iter().collect();
        entries.sort_by_key(|(_, idx)| *idx);

        let mut vocabulary = Self::new();
        for (expected, (term, found)) in entries.into_iter().enumerate() {
            let expected = expected as u32;
            if found != expected {
                return Err(VocabularyError::NotDense {
                    term,
                    expected,
                    found,
                });
            }
            vocabulary.insert(&term);
        }
        Ok(vocabulary)
    }
}

/// One row of a [`SparseMatrix`]: parallel column indices and weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseRow {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseRow {
    #[inline]
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        Self { indices, values }
    }

    /// Number of stored entries
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn max_index(&self) -> Option<u32> {
        self.indices.iter().copied().max()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SparseMatrixError {
    #[error("row {row} has {indices} indices but {values} values")]
    LengthMismatch {
        row: usize,
        indices: usize,
        values: usize,
    },
    #[error("row {row} references column {column} but the matrix has {cols} columns")]
    ColumnOutOfBounds { row: usize, column: u32, cols: usize },
    #[error("row {row} column indices are not strictly increasing")]
    UnsortedRow { row: usize },
    #[error("row pointers do not describe {rows} rows over {nnz} entries")]
    InvalidIndptr { rows: usize, nnz: usize },
}

/// Compressed sparse row matrix of BM25 weights.
///
/// Row `i` belongs to chunk `i` of the batch; columns are vocabulary indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSparseMatrix")]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl SparseMatrix {
    /// Assemble a matrix from per-row entries.
    ///
    /// Every row must have sorted, unique column indices below `cols`.
    #[inline]
    pub fn from_rows(rows: Vec<SparseRow>, cols: usize) -> Result<Self, SparseMatrixError> {
        let nnz = rows.iter().map(SparseRow::len).sum();
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);

        let row_count = rows.len();
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.indices.len() != row.values.len() {
                return Err(SparseMatrixError::LengthMismatch {
                    row: row_idx,
                    indices: row.indices.len(),
                    values: row.values.len(),
                });
            }
            if row.indices.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(SparseMatrixError::UnsortedRow { row: row_idx });
            }
            if let Some(column) = row.indices.iter().copied().find(|&c| c as usize >= cols) {
                return Err(SparseMatrixError::ColumnOutOfBounds {
                    row: row_idx,
                    column,
                    cols,
                });
            }
            indices.extend(row.indices);
            data.extend(row.values);
            indptr.push(indices.len());
        }

        Ok(Self {
            rows: row_count,
            cols,
            indptr,
            indices,
            data,
        })
    }

    /// `(rows, columns)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of stored entries
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn row(&self, row: usize) -> Option<SparseRow> {
        if row >= self.rows {
            return None;
        }
        let range = self.indptr[row]..self.indptr[row + 1];
        Some(SparseRow {
            indices: self.indices[range.clone()].to_vec(),
            values: self.data[range].to_vec(),
        })
    }

    #[inline]
    pub fn row_indices(&self, row: usize) -> &[u32] {
        if row >= self.rows {
            return &[];
        }
        &self.indices[self.indptr[row]..self.indptr[row + 1]]
    }

    /// Look up a single entry; missing entries read as zero.
    #[inline]
    pub fn get(&self, row: usize, col: u32) -> f32 {
        let columns = self.row_indices(row);
        columns
            .binary_search(&col)
            .map_or(0.0, |pos| self.data[self.indptr[row] + pos])
    }

    #[inline]
    pub fn rows(&self) -> impl Iterator<Item = SparseRow> + '_ {
        (0..self.rows).filter_map(|row| self.row(row))
    }
}

/// Serialized CSR form, checked before it becomes a [`SparseMatrix`]
#[derive(Deserialize)]
struct RawSparseMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl TryFrom<RawSparseMatrix> for SparseMatrix {
    type Error = SparseMatrixError;

    fn try_from(raw: RawSparseMatrix) -> Result<Self, Self::Error> {
        let nnz = raw.indices.len();
        let well_formed = raw.indptr.len() == raw.rows + 1
            && raw.indptr.first() == Some(&0)
            && raw.indptr.last() == Some(&nnz)
            && raw.indptr.windows(2).all(|pair| pair[0] <= pair[1]);
        if !well_formed {
            return Err(SparseMatrixError::InvalidIndptr {
                rows: raw.rows,
                nnz,
            });
        }
        if raw.data.len() != nnz {
            return Err(SparseMatrixError::LengthMismatch {
                row: 0,
                indices: nnz,
                values: raw.data.len(),
            });
        }

        let rows = raw
            .indptr
            .windows(2)
            .map(|pair| {
                SparseRow::new(
                    raw.indices[pair[0]..pair[1]].to_vec(),
                    raw.data[pair[0]..pair[1]].to_vec(),
                )
            })
            .collect();
        Self::from_rows(rows, raw.cols)
    }
}
