//! Configuration for the document analyzer.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The question every document is analysed against.
pub const DEFAULT_QUESTION: &str =
    "Does this document seem to be generated by AI? Provide a yes or no answer with a short explanation.";

/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default generative model identifier.
pub const DEFAULT_GENERATION_MODEL: &str = "tiiuae/falcon-7b-instruct";

/// Default location of the persisted vector index.
pub const DEFAULT_INDEX_LOCATION: &str = "./vector_store/faiss_index";

/// Default number of passages retrieved per query.
pub const DEFAULT_RETRIEVAL_K: usize = 5;

/// What the prompt's `context` slot is filled with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// The full extracted document text. Retrieval still runs and its
    /// results are reported alongside the answer.
    #[default]
    Document,
    /// The retrieved reference passages.
    Retrieved,
}

/// Configuration parameters for the [`DocumentAnalyzer`](crate::DocumentAnalyzer).
///
/// Created once at process start and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Identifier of the embedding model used to build and query the index.
    pub embedding_model: String,
    /// Identifier of the generative model.
    pub generation_model: String,
    /// Directory holding the persisted index.
    pub index_location: PathBuf,
    /// Number of passages to retrieve.
    pub retrieval_k: usize,
    /// The fixed analysis question.
    pub question: String,
    /// Source of the prompt context.
    pub context_source: ContextSource,
    /// Total attempts for model loading and generation (1 = no retry).
    pub generation_attempts: u32,
    /// Upper bound on a single generation call, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            index_location: PathBuf::from(DEFAULT_INDEX_LOCATION),
            retrieval_k: DEFAULT_RETRIEVAL_K,
            question: DEFAULT_QUESTION.to_string(),
            context_source: ContextSource::default(),
            generation_attempts: 1,
            generation_timeout_secs: None,
        }
    }
}

impl AnalyzerConfig {
    /// Create a new builder for constructing an [`AnalyzerConfig`].
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder::default()
    }

    /// Parse a JSON configuration and validate it.
    ///
    /// Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The generation timeout, if one is configured.
    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs.map(Duration::from_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `retrieval_k == 0`
    /// - `generation_attempts == 0`
    /// - `generation_timeout_secs == Some(0)`
    /// - either model identifier or the question is blank
    pub fn validate(&self) -> Result<()> {
        if self.retrieval_k == 0 {
            return Err(RagError::ConfigError("retrieval_k must be greater than zero".to_string()));
        }
        if self.generation_attempts == 0 {
            return Err(RagError::ConfigError(
                "generation_attempts must be greater than zero".to_string(),
            ));
        }
        if self.generation_timeout_secs == Some(0) {
            return Err(RagError::ConfigError(
                "generation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RagError::ConfigError("embedding_model must not be empty".to_string()));
        }
        if self.generation_model.trim().is_empty() {
            return Err(RagError::ConfigError("generation_model must not be empty".to_string()));
        }
        if self.question.trim().is_empty() {
            return Err(RagError::ConfigError("question must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`AnalyzerConfig`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the generative model identifier.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Set the directory holding the persisted index.
    pub fn index_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.config.index_location = location.into();
        self
    }

    /// Set the number of passages to retrieve.
    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval_k = k;
        self
    }

    /// Replace the analysis question.
    pub fn question(mut self, question: impl Into<String>) -> Self {
        self.config.question = question.into();
        self
    }

    /// Choose what fills the prompt's context slot.
    pub fn context_source(mut self, source: ContextSource) -> Self {
        self.config.context_source = source;
        self
    }

    /// Set the total number of attempts for model loading and generation.
    pub fn generation_attempts(mut self, attempts: u32) -> Self {
        self.config.generation_attempts = attempts;
        self
    }

    /// Bound each generation call.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Build the [`AnalyzerConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`AnalyzerConfig::validate`].
    pub fn build(self) -> Result<AnalyzerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_pipeline() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.retrieval_k, 5);
        assert_eq!(config.embedding_model, "all-MiniLM-L6-v2");
        assert_eq!(config.context_source, ContextSource::Document);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_rejects_zero_k() {
        let err = AnalyzerConfig::builder().retrieval_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn builder_rejects_zero_attempts_and_blank_models() {
        assert!(AnalyzerConfig::builder().generation_attempts(0).build().is_err());
        assert!(AnalyzerConfig::builder().embedding_model("  ").build().is_err());
        assert!(AnalyzerConfig::builder().generation_timeout(Duration::from_millis(10)).build().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AnalyzerConfig::from_json(
            r#"{ "index_location": "/tmp/idx", "retrieval_k": 3, "context_source": "retrieved" }"#,
        )
        .unwrap();
        assert_eq!(config.index_location, PathBuf::from("/tmp/idx"));
        assert_eq!(config.retrieval_k, 3);
        assert_eq!(config.context_source, ContextSource::Retrieved);
        assert_eq!(config.question, DEFAULT_QUESTION);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(
            AnalyzerConfig::from_json(r#"{ "retrieval_k": 0 }"#),
            Err(RagError::ConfigError(_))
        ));
        assert!(matches!(AnalyzerConfig::from_json("not json"), Err(RagError::ConfigError(_))));
    }
}
