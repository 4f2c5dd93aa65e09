//! Persistent vector index with exact cosine-similarity search.
//!
//! A [`VectorIndex`] is an ordered list of chunk texts and their embeddings,
//! stored on disk as `<location>/index.json` together with the identifier and
//! dimensionality of the embedding model that produced the vectors. An index
//! can only be obtained by [`VectorIndex::build`] (which persists it) or
//! [`VectorIndex::load`], so every in-memory index has a durable counterpart.
//!
//! # Example
//!
//! ```rust,ignore
//! use docsense_rag::VectorIndex;
//!
//! let corpus = ["AI-generated text often lacks human creativity."];
//! VectorIndex::build(&corpus, &embedder, "./vector_store").await?;
//!
//! let index = VectorIndex::load("./vector_store", &embedder).await?;
//! let results = index.query(&embedder.embed("creativity").await?, 5)?;
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::document::{Chunk, RetrievalResult, ScoredChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// File name of the serialized index inside its location directory.
pub const INDEX_FILE_NAME: &str = "index.json";

/// Version of the on-disk layout. Bumped on any incompatible change.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// An in-memory view of a persisted vector index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    location: PathBuf,
    embedding_model: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

// ── On-disk representation ─────────────────────────────────────────

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    format_version: u32,
    embedding_model: &'a str,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<PersistedEntryRef<'a>>,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a> {
    text: &'a str,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct FormatProbe {
    format_version: u32,
}

#[derive(Deserialize)]
struct PersistedIndex {
    embedding_model: String,
    dimensions: usize,
    created_at: DateTime<Utc>,
    entries: Vec<PersistedEntry>,
}

#[derive(Deserialize)]
struct PersistedEntry {
    text: String,
    embedding: Vec<f32>,
}

/// Compute cosine similarity between two vectors.
///
/// Accumulates in `f64` so large finite components cannot overflow.
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

fn is_finite_vector(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl VectorIndex {
    /// Embed every chunk, then persist the index at `location`.
    ///
    /// Building is all-or-nothing: if any embedding fails or has the wrong
    /// dimension, nothing is written and any index already at `location` is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Build`] if the corpus is empty, an embedding call
    /// fails, an embedding is malformed, or the index cannot be written.
    pub async fn build<S: AsRef<str>>(
        chunks: &[S],
        embedder: &dyn EmbeddingProvider,
        location: impl AsRef<Path>,
    ) -> Result<Self> {
        let location = location.as_ref();
        if chunks.is_empty() {
            return Err(RagError::Build("corpus must contain at least one chunk".to_string()));
        }

        let dimensions = embedder.dimensions();
        if dimensions == 0 {
            return Err(RagError::Build(format!(
                "embedding model '{}' reports zero dimensions",
                embedder.model_id()
            )));
        }

        let texts: Vec<&str> = chunks.iter().map(AsRef::as_ref).collect();
        let embeddings = embedder.embed_batch(&texts).await.map_err(|e| {
            error!(model = embedder.model_id(), error = %e, "embedding failed during index build");
            RagError::Build(format!("embedding failed: {e}"))
        })?;

        if embeddings.len() != texts.len() {
            return Err(RagError::Build(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let mut entries = Vec::with_capacity(texts.len());
        for (position, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            if embedding.len() != dimensions {
                return Err(RagError::Build(format!(
                    "chunk {position} has {} dimensions, expected {dimensions}",
                    embedding.len()
                )));
            }
            if !is_finite_vector(&embedding) {
                return Err(RagError::Build(format!(
                    "chunk {position} has a non-finite embedding"
                )));
            }
            entries.push(IndexEntry {
                chunk: Chunk { position, text: (*text).to_string() },
                embedding,
            });
        }

        let index = Self {
            location: location.to_path_buf(),
            embedding_model: embedder.model_id().to_string(),
            dimensions,
            created_at: Utc::now(),
            entries,
        };
        index.persist(location).await?;

        info!(
            location = %location.display(),
            model = %index.embedding_model,
            chunk_count = index.len(),
            "vector index built"
        );
        Ok(index)
    }

    /// Write the index to `<location>/index.json`, replacing any existing one.
    ///
    /// The file is written next to its final path and renamed into place, so a
    /// concurrent reader sees either the old or the new index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Build`] if the directory or file cannot be written.
    pub async fn persist(&self, location: impl AsRef<Path>) -> Result<()> {
        let location = location.as_ref();
        let persist_err = |e: std::io::Error| {
            error!(location = %location.display(), error = %e, "failed to persist index");
            RagError::Build(format!("failed to persist index to {}: {e}", location.display()))
        };

        let payload = serde_json::to_vec(&PersistedIndexRef {
            format_version: FORMAT_VERSION,
            embedding_model: &self.embedding_model,
            dimensions: self.dimensions,
            created_at: self.created_at,
            entries: self
                .entries
                .iter()
                .map(|e| PersistedEntryRef { text: &e.chunk.text, embedding: &e.embedding })
                .collect(),
        })
        .map_err(|e| RagError::Build(format!("failed to serialize index: {e}")))?;

        tokio::fs::create_dir_all(location).await.map_err(persist_err)?;
        let tmp_path = location.join(format!("{INDEX_FILE_NAME}.tmp"));
        tokio::fs::write(&tmp_path, payload).await.map_err(persist_err)?;
        tokio::fs::rename(&tmp_path, location.join(INDEX_FILE_NAME)).await.map_err(persist_err)?;

        debug!(location = %location.display(), chunk_count = self.len(), "index persisted");
        Ok(())
    }

    /// Load a persisted index and check it against `embedder`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if there is no index at `location`.
    /// - [`RagError::IndexIncompatible`] if the index was built with a
    ///   different embedding model, dimension, or on-disk format.
    /// - [`RagError::IndexCorrupt`] if the file cannot be read or decoded.
    pub async fn load(location: impl AsRef<Path>, embedder: &dyn EmbeddingProvider) -> Result<Self> {
        let location = location.as_ref();
        let path = location.join(INDEX_FILE_NAME);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound { location: location.to_path_buf() });
            }
            Err(e) => {
                return Err(RagError::IndexCorrupt {
                    location: location.to_path_buf(),
                    message: format!("failed to read {}: {e}", path.display()),
                });
            }
        };

        let corrupt = |message: String| RagError::IndexCorrupt {
            location: location.to_path_buf(),
            message,
        };
        let incompatible = |reason: String| RagError::IndexIncompatible {
            location: location.to_path_buf(),
            reason,
        };

        let probe: FormatProbe = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt(format!("failed to decode header: {e}")))?;
        if probe.format_version != FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} is not supported (expected {FORMAT_VERSION})",
                probe.format_version
            )));
        }

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("failed to decode: {e}")))?;

        if persisted.embedding_model != embedder.model_id() {
            return Err(incompatible(format!(
                "built with embedding model '{}', loaded with '{}'",
                persisted.embedding_model,
                embedder.model_id()
            )));
        }
        if persisted.dimensions != embedder.dimensions() {
            return Err(incompatible(format!(
                "index has {} dimensions, embedding model produces {}",
                persisted.dimensions,
                embedder.dimensions()
            )));
        }

        let mut entries = Vec::with_capacity(persisted.entries.len());
        for (position, entry) in persisted.entries.into_iter().enumerate() {
            if entry.embedding.len() != persisted.dimensions {
                return Err(corrupt(format!(
                    "entry {position} has {} dimensions, expected {}",
                    entry.embedding.len(),
                    persisted.dimensions
                )));
            }
            if !is_finite_vector(&entry.embedding) {
                return Err(corrupt(format!("entry {position} has a non-finite embedding")));
            }
            entries.push(IndexEntry {
                chunk: Chunk { position, text: entry.text },
                embedding: entry.embedding,
            });
        }

        info!(
            location = %location.display(),
            model = %persisted.embedding_model,
            chunk_count = entries.len(),
            "vector index loaded"
        );

        Ok(Self {
            location: location.to_path_buf(),
            embedding_model: persisted.embedding_model,
            dimensions: persisted.dimensions,
            created_at: persisted.created_at,
            entries,
        })
    }

    /// Whether an index file is present at `location`.
    pub async fn exists(location: impl AsRef<Path>) -> bool {
        tokio::fs::try_exists(location.as_ref().join(INDEX_FILE_NAME)).await.unwrap_or(false)
    }

    /// Return the `k` chunks most similar to `query_vector`.
    ///
    /// Results are ordered by descending cosine similarity; equal scores keep
    /// insertion order. When the index holds fewer than `k` chunks, all of
    /// them are returned.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k` is zero or the vector has
    ///   non-finite components.
    /// - [`RagError::DimensionMismatch`] if the vector dimension differs from
    ///   the index.
    pub fn query(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be at least 1".to_string()));
        }
        if query_vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }
        if !is_finite_vector(query_vector) {
            return Err(RagError::InvalidArgument(
                "query vector has non-finite components".to_string(),
            ));
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(&entry.embedding, query_vector),
            })
            .collect();

        // stable: entries are in insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(RetrievalResult::new(scored))
    }

    /// Check that `embedder` produces vectors comparable with this index.
    pub fn ensure_compatible(&self, embedder: &dyn EmbeddingProvider) -> Result<()> {
        if self.embedding_model != embedder.model_id() || self.dimensions != embedder.dimensions()
        {
            return Err(RagError::IndexIncompatible {
                location: self.location.clone(),
                reason: format!(
                    "index uses '{}' ({} dims), embedder is '{}' ({} dims)",
                    self.embedding_model,
                    self.dimensions,
                    embedder.model_id(),
                    embedder.dimensions()
                ),
            });
        }
        Ok(())
    }

    /// Where the index was built or loaded from.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Identifier of the embedding model the index was built with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// When the index was built.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(vectors: &[Vec<f32>]) -> VectorIndex {
        VectorIndex {
            location: PathBuf::from("mem"),
            embedding_model: "test".into(),
            dimensions: vectors[0].len(),
            created_at: Utc::now(),
            entries: vectors
                .iter()
                .enumerate()
                .map(|(position, v)| IndexEntry {
                    chunk: Chunk { position, text: format!("chunk-{position}") },
                    embedding: v.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn large_components_score_finitely() {
        let index = index_of(&[vec![2.0, 1.0], vec![-1e20, 1e20]]);
        let result = index.query(&[2e20, 1e20], 2).unwrap();

        assert!(result.iter().all(|r| r.score.is_finite()));
        let top = result.top().unwrap();
        assert_eq!(top.chunk.position, 0);
        assert!((top.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let index = index_of(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]]);
        let result = index.query(&[1.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = result.iter().map(|r| r.chunk.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn returns_everything_when_k_exceeds_len() {
        let index = index_of(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let result = index.query(&[1.0, 1.0], 10).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn rejects_zero_k_and_wrong_dimension() {
        let index = index_of(&[vec![1.0, 0.0]]);
        assert!(matches!(index.query(&[1.0, 0.0], 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(index.query(&[f32::NAN, 0.0], 1), Err(RagError::InvalidArgument(_))));
    }
}
