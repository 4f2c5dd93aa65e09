//! Data types for documents, chunks, and retrieval results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A document submitted for analysis.
///
/// Holds the raw bytes as read from the source and the text extracted from
/// them. A document lives for the duration of one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The raw document bytes.
    pub bytes: Vec<u8>,
    /// The extracted plain text. May be empty.
    pub text: String,
    /// Optional path the document was read from.
    pub source_path: Option<PathBuf>,
}

impl Document {
    /// Whether the extracted text contains anything besides whitespace.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A unit of indexed text.
///
/// Chunks are whole corpus strings; `position` is the insertion order within
/// the index and breaks ties between equally similar chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Insertion position within the index.
    pub position: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// The outcome of a nearest-neighbour query.
///
/// Results are ordered by descending score; equal scores keep insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    results: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub(crate) fn new(results: Vec<ScoredChunk>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.results.iter()
    }

    /// The best match, if any.
    pub fn top(&self) -> Option<&ScoredChunk> {
        self.results.first()
    }

    /// Chunk texts in result order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.chunk.text.as_str())
    }

    /// Chunk texts joined by a blank line, the form used as prompt context.
    pub fn joined_text(&self) -> String {
        self.texts().collect::<Vec<_>>().join("\n\n")
    }

    pub fn into_vec(self) -> Vec<ScoredChunk> {
        self.results
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
