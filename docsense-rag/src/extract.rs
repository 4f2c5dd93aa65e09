//! Text extraction from document bytes.
//!
//! Extraction is a pure function from bytes to text. [`AutoDetectExtractor`]
//! picks a format from the leading bytes, so callers do not need a file name
//! to analyse a document.

use tracing::debug;

use crate::error::{RagError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Converts a document's raw bytes into plain text.
///
/// An empty result is not an error; the analyzer decides what to do with it.
pub trait TextExtractor: Send + Sync {
    /// Extract the plain text of a document.
    fn extract(&self, bytes: &[u8]) -> Result<String>;

    /// A short name used in logs.
    fn name(&self) -> &str;
}

/// Decodes UTF-8 text, dropping a leading byte-order mark.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            RagError::Extraction(format!(
                "document is not valid UTF-8 text (invalid byte at offset {})",
                e.utf8_error().valid_up_to()
            ))
        })
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Extracts the text layer of a PDF document.
///
/// This type is only available when the `pdf` feature is enabled.
#[cfg(feature = "pdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[cfg(feature = "pdf")]
impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {e}")))
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Sniffs the document format and delegates to the matching extractor.
///
/// PDF documents (starting with `%PDF-`) need the `pdf` feature; everything
/// else is decoded as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDetectExtractor;

impl AutoDetectExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for AutoDetectExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        if bytes.starts_with(PDF_MAGIC) {
            debug!(byte_len = bytes.len(), "detected PDF document");
            return extract_pdf(bytes);
        }
        PlainTextExtractor.extract(bytes)
    }

    fn name(&self) -> &str {
        "auto"
    }
}

#[cfg(feature = "pdf")]
fn extract_pdf(bytes: &[u8]) -> Result<String> {
    PdfTextExtractor.extract(bytes)
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String> {
    Err(RagError::Extraction(
        "PDF documents require the `pdf` feature of docsense-rag".to_string(),
    ))
}
