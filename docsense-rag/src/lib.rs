//! # docsense-rag
//!
//! Retrieval-augmented document analysis.
//!
//! ## Overview
//!
//! A [`DocumentAnalyzer`] takes an uploaded document, extracts its text,
//! retrieves reference passages from a persisted [`VectorIndex`], renders a
//! [`PromptTemplate`] and asks a generative model one fixed question about
//! the document (by default: was it written by AI?).
//!
//! - [`VectorIndex`] - build, persist, load and query a cosine-similarity index
//! - [`Retriever`] - top-k retrieval of reference passages
//! - [`PromptTemplate`] - `{context}` / `{question}` slot rendering
//! - [`GenerationEngine`] - load-once model handle with bounded retries
//! - [`TextExtractor`] - plain text and (with `pdf`) PDF extraction
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI-compatible embeddings and chat completions |
//! | `pdf` | PDF text extraction via `pdf-extract` |
//! | `full` | Everything above |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docsense_rag::{AnalyzerConfig, DocumentAnalyzer};
//! use docsense_rag::openai::OpenAIEmbeddingProvider;
//! use docsense_rag::openai_chat::OpenAIModelLoader;
//!
//! let embedder = OpenAIEmbeddingProvider::from_env()?;
//! let config = AnalyzerConfig::builder()
//!     .embedding_model(embedder.model_id())
//!     .generation_model("gpt-4o-mini")
//!     .build()?;
//!
//! let analyzer = DocumentAnalyzer::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(embedder))
//!     .model_loader(Arc::new(OpenAIModelLoader::new(std::env::var("OPENAI_API_KEY")?)))
//!     .build()?;
//!
//! analyzer.build_index(&["Reference passage one.", "Reference passage two."]).await?;
//! let answer = analyzer.analyze_path("sample.pdf").await?;
//! ```

pub mod analyzer;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod prompt;
pub mod retriever;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub mod openai_chat;

pub use analyzer::{Analysis, DocumentAnalyzer, DocumentAnalyzerBuilder};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, ContextSource};
pub use document::{Chunk, Document, RetrievalResult, ScoredChunk};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result, Stage};
pub use extract::{AutoDetectExtractor, PlainTextExtractor, TextExtractor};
pub use generation::{Answer, GenerationEngine, GenerativeModel, ModelHandle, ModelLoader};
pub use index::{INDEX_FILE_NAME, VectorIndex};
pub use prompt::{Prompt, PromptContext, PromptTemplate, Slot};
pub use retriever::Retriever;

#[cfg(feature = "pdf")]
pub use extract::PdfTextExtractor;
