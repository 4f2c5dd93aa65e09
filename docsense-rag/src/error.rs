//! Error types for the `docsense-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building an index or analysing a document.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document could not be read or decoded into text.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Extraction succeeded but produced no text after trimming whitespace.
    #[error("No text could be extracted from the document.")]
    EmptyDocument,

    /// No persisted index exists at the configured location.
    #[error("Vector index not found at {}. Build it first.", location.display())]
    IndexNotFound {
        /// The location that was searched.
        location: PathBuf,
    },

    /// The persisted index was produced by a different embedding model or format.
    #[error("Vector index at {} is incompatible: {reason}", location.display())]
    IndexIncompatible {
        /// The location of the offending index.
        location: PathBuf,
        /// What did not match.
        reason: String,
    },

    /// The persisted index exists but could not be decoded.
    #[error("Vector index at {} is corrupt: {message}", location.display())]
    IndexCorrupt {
        /// The location of the offending index.
        location: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// Building the index failed; nothing was persisted.
    #[error("Index build error: {0}")]
    Build(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the dimension the index expects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index dimension.
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// An argument was outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A prompt template was malformed or a slot value was missing.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// The generative model could not be located or initialised.
    #[error("Model load error ({model}): {message}")]
    ModelLoad {
        /// The model identifier that failed to load.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// Inference failed for the current request.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// The pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the document and turning it into text.
    Extraction,
    /// Building, persisting or loading the vector index.
    Index,
    /// Embedding the query and searching the index.
    Retrieval,
    /// Rendering the prompt, loading the model and running inference.
    Generation,
    /// Invalid configuration or arguments.
    Configuration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Index => "index",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

impl RagError {
    /// The pipeline stage this error originated from.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Extraction(_) | RagError::EmptyDocument => Stage::Extraction,
            RagError::IndexNotFound { .. }
            | RagError::IndexIncompatible { .. }
            | RagError::IndexCorrupt { .. }
            | RagError::Build(_) => Stage::Index,
            RagError::EmbeddingError { .. } | RagError::DimensionMismatch { .. } => {
                Stage::Retrieval
            }
            RagError::TemplateError(_) | RagError::ModelLoad { .. } | RagError::Generation(_) => {
                Stage::Generation
            }
            RagError::InvalidArgument(_) | RagError::ConfigError(_) => Stage::Configuration,
        }
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Only model loading and inference are retried by the pipeline.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::ModelLoad { .. } | RagError::Generation(_))
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
