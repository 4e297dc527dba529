//! Flat in-memory vector index. A FAISS `IndexFlatIP` does an exhaustive
//! inner-product scan under the hood for indexes this size; we do the same
//! scan directly instead of linking a vector-search library for a few
//! thousand service vectors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serialized form: dimension plus row-major vectors, position = id.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// A flat, exhaustively-scanned vector index. Position in `vectors` is the
/// `id` referenced by the metadata document.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// One hit from [`VectorIndex::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchHit {
    /// Position inside the index — looked up against the metadata document's `id` field
    pub id: usize,
    /// Inner product between the query and this vector
    pub score: f32,
}

impl VectorIndex {
    /// An empty index, used before the first successful load.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dimension: 0,
            vectors: Vec::new(),
        }
    }

    /// Load an index from its serialized file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file: IndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::VaultCorrupt(format!("tool index {}: {e}", path.display())))?;
        Ok(Self {
            dimension: file.dimension,
            vectors: file.vectors,
        })
    }

    /// Total vector count, i.e. `ntotal` in FAISS terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Embedding dimension fixed at build time.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return the `top_k` vectors with highest inner product against `query`.
    #[must_use]
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, vector)| SearchHit {
                id,
                score: inner_product(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        hits
    }
}

/// Cosine similarity between two equal-length vectors, used for the tool-level
/// re-ranking pass.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = inner_product(a, b);
    let norm_a = inner_product(a, a).sqrt();
    let norm_b = inner_product(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_index(path: &Path, vectors: Vec<Vec<f32>>) {
        let file = IndexFile { dimension: vectors.first().map_or(0, Vec::len), vectors };
        std::fs::write(path, serde_json::to_vec(&file).unwrap()).unwrap();
    }

    #[test]
    fn search_returns_closest_vectors_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        write_index(&path, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]);

        let index = VectorIndex::load(&path).unwrap();
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[1].id, 2);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
