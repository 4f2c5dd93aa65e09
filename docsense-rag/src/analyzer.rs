//! Document analysis orchestrator.
//!
//! The [`DocumentAnalyzer`] runs extraction → retrieval → prompt rendering →
//! generation for one document at a time. It is meant to live for the whole
//! process: the vector index and the model handle are loaded once and reused
//! by every request.
//!
//! # Example
//!
//! ```rust,ignore
//! use docsense_rag::{AnalyzerConfig, DocumentAnalyzer};
//!
//! let analyzer = DocumentAnalyzer::builder()
//!     .config(AnalyzerConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .model_loader(Arc::new(my_loader))
//!     .build()?;
//!
//! analyzer.start().await?;
//! let answer = analyzer.analyze_path("uploads/sample.pdf").await?;
//! println!("{answer}");
//! analyzer.shutdown().await;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AnalyzerConfig, ContextSource};
use crate::document::{Document, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::{AutoDetectExtractor, TextExtractor};
use crate::generation::{Answer, GenerationEngine, ModelLoader};
use crate::index::VectorIndex;
use crate::prompt::{Prompt, PromptTemplate};
use crate::retriever::Retriever;

/// Everything produced while analysing one document.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// The model's answer, verbatim.
    pub answer: Answer,
    /// The prompt the answer was generated from.
    pub prompt: Prompt,
    /// The reference passages retrieved for the analysis question.
    pub references: RetrievalResult,
}

/// The analysis orchestrator.
///
/// Construct one via [`DocumentAnalyzer::builder()`].
pub struct DocumentAnalyzer {
    config: AnalyzerConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    engine: GenerationEngine,
    retriever: Retriever,
    template: PromptTemplate,
    index: RwLock<Option<Arc<VectorIndex>>>,
}

impl DocumentAnalyzer {
    /// Create a new [`DocumentAnalyzerBuilder`].
    pub fn builder() -> DocumentAnalyzerBuilder {
        DocumentAnalyzerBuilder::default()
    }

    /// Return a reference to the analyzer configuration.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Return a reference to the generation engine.
    pub fn engine(&self) -> &GenerationEngine {
        &self.engine
    }

    /// Load the generative model and, if one exists, the vector index.
    ///
    /// A missing index is not an error here; analyses fail with
    /// [`RagError::IndexNotFound`] until one is built.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoad`] if the model cannot be loaded, or any
    /// index error other than a missing index.
    pub async fn start(&self) -> Result<()> {
        self.engine.load().await?;
        match self.index().await {
            Ok(index) => {
                info!(chunk_count = index.len(), "analyzer started with index");
            }
            Err(RagError::IndexNotFound { location }) => {
                warn!(location = %location.display(), "analyzer started without an index");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Release the model handle and the cached index.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.index.write().await.take();
        info!("analyzer shut down");
    }

    /// Return the vector index, loading it from disk on first use.
    ///
    /// A failed load is not cached, so a later call sees an index built in
    /// the meantime.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(index.clone());
        }
        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }
        let index = Arc::new(
            VectorIndex::load(&self.config.index_location, self.embedding_provider.as_ref()).await?,
        );
        *slot = Some(index.clone());
        Ok(index)
    }

    /// Build and persist a new index from `corpus`, replacing the cached one.
    ///
    /// Analyses running in this process wait for the build to finish. Builds
    /// from other processes must be serialised externally.
    pub async fn build_index<S: AsRef<str>>(&self, corpus: &[S]) -> Result<Arc<VectorIndex>> {
        let mut slot = self.index.write().await;
        let index = Arc::new(
            VectorIndex::build(
                corpus,
                self.embedding_provider.as_ref(),
                &self.config.index_location,
            )
            .await?,
        );
        *slot = Some(index.clone());
        Ok(index)
    }

    /// Drop the cached index so the next analysis reloads it from disk.
    pub async fn invalidate_index(&self) {
        self.index.write().await.take();
    }

    /// Read the file at `path` and analyse it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if the file cannot be read, then
    /// anything [`analyze_document`](Self::analyze_document) returns.
    pub async fn analyze_path(&self, path: impl AsRef<Path>) -> Result<Answer> {
        Ok(self.analyze_path_detailed(path).await?.answer)
    }

    /// Like [`analyze_path`](Self::analyze_path), returning the full [`Analysis`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn analyze_path_detailed(&self, path: impl AsRef<Path>) -> Result<Analysis> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!(error = %e, "failed to read document");
            RagError::Extraction(format!("failed to read {}: {e}", path.display()))
        })?;
        let document = self.extract(bytes, Some(path.to_path_buf())).await?;
        self.analyze_extracted(document).await
    }

    /// Analyse a document given its raw bytes and return the answer verbatim.
    ///
    /// # Errors
    ///
    /// - [`RagError::Extraction`] if the bytes cannot be turned into text.
    /// - [`RagError::EmptyDocument`] if the text is empty after trimming; no
    ///   index load, retrieval, or generation happens in that case.
    /// - [`RagError::IndexNotFound`] / [`RagError::IndexIncompatible`] from
    ///   loading the index. The index is never built implicitly.
    /// - [`RagError::ModelLoad`] / [`RagError::Generation`] from generation.
    pub async fn analyze_document(&self, bytes: Vec<u8>) -> Result<Answer> {
        Ok(self.analyze_document_detailed(bytes).await?.answer)
    }

    /// Like [`analyze_document`](Self::analyze_document), returning the full [`Analysis`].
    #[instrument(skip_all, fields(byte_len = bytes.len()))]
    pub async fn analyze_document_detailed(&self, bytes: Vec<u8>) -> Result<Analysis> {
        let document = self.extract(bytes, None).await?;
        self.analyze_extracted(document).await
    }

    async fn extract(&self, bytes: Vec<u8>, source_path: Option<PathBuf>) -> Result<Document> {
        let extractor = self.extractor.clone();
        let (bytes, text) = tokio::task::spawn_blocking(move || {
            let text = extractor.extract(&bytes);
            (bytes, text)
        })
        .await
        .map_err(|e| RagError::Extraction(format!("extraction task failed: {e}")))?;

        let text = text.map_err(|e| {
            error!(extractor = self.extractor.name(), error = %e, "extraction failed");
            e
        })?;
        debug!(extractor = self.extractor.name(), text_len = text.len(), "text extracted");
        Ok(Document { bytes, text, source_path })
    }

    async fn analyze_extracted(&self, document: Document) -> Result<Analysis> {
        // 1. Short-circuit on empty text
        if !document.has_text() {
            warn!(byte_len = document.bytes.len(), "no text extracted from document");
            return Err(RagError::EmptyDocument);
        }
        let text = document.text.trim();
        let question = self.config.question.as_str();

        // 2. Load the index; building is the caller's responsibility
        let index = self.index().await.map_err(|e| {
            error!(error = %e, "vector index unavailable");
            e
        })?;

        // 3. Retrieve reference passages for the analysis question
        let references =
            self.retriever.retrieve(&index, question, self.embedding_provider.as_ref()).await?;

        // 4. Render the prompt
        let prompt = match self.config.context_source {
            ContextSource::Document => self.template.render(text, question),
            ContextSource::Retrieved => self.template.render(&references, question),
        };

        // 5. Generate
        let answer = self.engine.generate(&prompt).await.map_err(|e| {
            error!(error = %e, "generation failed");
            e
        })?;

        info!(
            source = ?document.source_path,
            text_len = text.len(),
            reference_count = references.len(),
            answer_len = answer.as_str().len(),
            "document analysed"
        );

        Ok(Analysis { answer, prompt, references })
    }
}

/// Builder for constructing a [`DocumentAnalyzer`].
///
/// `embedding_provider` and `model_loader` are required; the configuration
/// defaults to [`AnalyzerConfig::default()`], the extractor to
/// [`AutoDetectExtractor`], and the template to [`PromptTemplate::default()`].
#[derive(Default)]
pub struct DocumentAnalyzerBuilder {
    config: Option<AnalyzerConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    model_loader: Option<Arc<dyn ModelLoader>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    template: Option<PromptTemplate>,
}

impl DocumentAnalyzerBuilder {
    /// Set the analyzer configuration.
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the loader for the generative model.
    pub fn model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.model_loader = Some(loader);
        self
    }

    /// Set the text extractor.
    pub fn text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Build the [`DocumentAnalyzer`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// configuration is invalid, or the embedding provider is not the model
    /// named by `embedding_model`.
    pub fn build(self) -> Result<DocumentAnalyzer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let model_loader = self
            .model_loader
            .ok_or_else(|| RagError::ConfigError("model_loader is required".to_string()))?;

        if embedding_provider.model_id() != config.embedding_model {
            return Err(RagError::ConfigError(format!(
                "embedding provider serves '{}' but the configuration names '{}'",
                embedding_provider.model_id(),
                config.embedding_model
            )));
        }

        let mut engine = GenerationEngine::new(model_loader, config.generation_model.clone())
            .with_attempts(config.generation_attempts);
        if let Some(timeout) = config.generation_timeout() {
            engine = engine.with_timeout(timeout);
        }

        Ok(DocumentAnalyzer {
            retriever: Retriever::new(config.retrieval_k)?,
            extractor: self.extractor.unwrap_or_else(|| Arc::new(AutoDetectExtractor::new())),
            template: self.template.unwrap_or_default(),
            config,
            embedding_provider,
            engine,
            index: RwLock::new(None),
        })
    }
}
