//! Local embedding model, loaded once per process and cached — the Rust
//! equivalent of the teacher-adjacent `SentenceTransformer` load-once
//! pattern, backed by an in-process ONNX model instead of a Python process.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Wraps a `fastembed` encoder behind a mutex — `TextEmbedding::embed` takes
/// `&mut self`, and we want one model shared across concurrent callers.
pub struct Embedder {
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl Embedder {
    /// Load the embedding model once. Subsequent calls reuse the same
    /// instance; this is never reloaded for the lifetime of the process.
    pub fn load() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| Error::Internal(format!("failed to load embedding model: {e}")))?;

        // all-MiniLM-L6-v2 produces 384-dimensional embeddings.
        let dimension = 384;

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }

    /// Embedding dimension of the loaded model.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single piece of text into a dense vector.
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_many(&[text])?;
        embeddings
            .pop()
            .ok_or_else(|| Error::Internal("embedding model returned no vectors".to_string()))
    }

    /// Embed a batch of texts in one model invocation.
    pub fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock();
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Internal(format!("embedding inference failed: {e}")))
    }
}
