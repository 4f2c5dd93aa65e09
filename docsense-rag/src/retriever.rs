//! Top-k retrieval over a [`VectorIndex`].

use tracing::{debug, error};

use crate::config::DEFAULT_RETRIEVAL_K;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Fixes the number of results and the similarity metric for index queries.
///
/// Similarity is cosine, as computed by [`VectorIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retriever {
    k: usize,
}

impl Default for Retriever {
    fn default() -> Self {
        Self { k: DEFAULT_RETRIEVAL_K }
    }
}

impl Retriever {
    /// Create a retriever returning at most `k` results.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `k` is zero.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RagError::ConfigError("retrieval k must be greater than zero".to_string()));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Embed `query_text` and return its nearest neighbours in `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexIncompatible`] if `embedder` is not the model
    /// the index was built with, [`RagError::EmbeddingError`] if embedding
    /// fails, and propagates [`VectorIndex::query`] failures unchanged.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        query_text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<RetrievalResult> {
        index.ensure_compatible(embedder)?;

        let query_vector = embedder.embed(query_text).await.map_err(|e| {
            error!(model = embedder.model_id(), error = %e, "query embedding failed");
            match e {
                RagError::EmbeddingError { .. } => e,
                other => RagError::EmbeddingError {
                    provider: embedder.model_id().to_string(),
                    message: other.to_string(),
                },
            }
        })?;

        let results = index.query(&query_vector, self.k)?;
        debug!(
            k = self.k,
            result_count = results.len(),
            top_score = results.top().map(|r| r.score),
            "retrieval completed"
        );
        Ok(results)
    }
}
