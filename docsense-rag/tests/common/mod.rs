//! Deterministic test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docsense_rag::{
    EmbeddingProvider, GenerativeModel, ModelLoader, Prompt, RagError, Result, TextExtractor,
};

/// Embeds text as a 26-dim letter histogram plus a constant bias component.
///
/// The bias keeps every vector non-zero, so cosine similarity is defined for
/// any input.
pub struct LetterEmbedder {
    model: String,
    pub calls: AtomicUsize,
}

impl LetterEmbedder {
    pub const DIMENSIONS: usize = 27;

    pub fn new(model: &str) -> Self {
        Self { model: model.to_string(), calls: AtomicUsize::new(0) }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; Self::DIMENSIONS];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        v[26] = 1.0;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Embeds text as `[char_count, 1.0]`.
pub struct CharCountEmbedder;

#[async_trait]
impl EmbeddingProvider for CharCountEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.chars().count() as f32, 1.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "char-count"
    }
}

/// Fails on the `n`th text it is asked to embed (zero-based).
pub struct FailingEmbedder {
    pub fail_at: usize,
    seen: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(fail_at: usize) -> Self {
        Self { fail_at, seen: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.seen.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(RagError::EmbeddingError {
                provider: "failing".into(),
                message: "backend unavailable".into(),
            });
        }
        Ok(LetterEmbedder::vector(text))
    }

    fn dimensions(&self) -> usize {
        LetterEmbedder::DIMENSIONS
    }

    fn model_id(&self) -> &str {
        "letters"
    }
}

/// Returns a fixed text for any input and counts invocations.
pub struct FixedExtractor {
    text: String,
    pub calls: AtomicUsize,
}

impl FixedExtractor {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string(), calls: AtomicUsize::new(0) }
    }
}

impl TextExtractor for FixedExtractor {
    fn extract(&self, _bytes: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Answers with the prompt it was given.
pub struct EchoModel {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl GenerativeModel for EchoModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.as_str().to_string())
    }
}

/// Loads [`EchoModel`]s and counts loads and generations.
#[derive(Default)]
pub struct EchoLoader {
    pub loads: AtomicUsize,
    pub generations: Arc<AtomicUsize>,
}

impl EchoLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for EchoLoader {
    async fn load_model(&self, _model_id: &str) -> Result<Arc<dyn GenerativeModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoModel { calls: self.generations.clone() }))
    }
}
