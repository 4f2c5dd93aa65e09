//! Prompt templates with `{context}` and `{question}` slots.
//!
//! Templates are parsed once into literal and slot segments and rendered in a
//! single pass, so slot-like text inside a substituted value is never
//! expanded a second time. `{{` and `}}` produce literal braces.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::document::RetrievalResult;
use crate::error::{RagError, Result};

/// The analysis prompt template.
pub const DEFAULT_TEMPLATE: &str =
    "Given the following context:\n{context}\n\nAnswer the question:\n{question}\n";

/// A named placeholder in a [`PromptTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Context,
    Question,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Context => "context",
            Slot::Question => "question",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "context" => Some(Slot::Context),
            "question" => Some(Slot::Question),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

/// A fully rendered, generation-ready prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Prompt(String);

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What fills the `{context}` slot.
#[derive(Debug, Clone, Copy)]
pub enum PromptContext<'a> {
    /// Raw text, inserted verbatim.
    Text(&'a str),
    /// Retrieved passages, joined by a blank line.
    Retrieved(&'a RetrievalResult),
}

impl<'a> From<&'a str> for PromptContext<'a> {
    fn from(text: &'a str) -> Self {
        PromptContext::Text(text)
    }
}

impl<'a> From<&'a String> for PromptContext<'a> {
    fn from(text: &'a String) -> Self {
        PromptContext::Text(text.as_str())
    }
}

impl<'a> From<&'a RetrievalResult> for PromptContext<'a> {
    fn from(result: &'a RetrievalResult) -> Self {
        PromptContext::Retrieved(result)
    }
}

/// A parsed template containing exactly the `context` and `question` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl Default for PromptTemplate {
    /// The parsed form of [`DEFAULT_TEMPLATE`].
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Literal("Given the following context:\n".into()),
                Segment::Slot(Slot::Context),
                Segment::Literal("\n\nAnswer the question:\n".into()),
                Segment::Slot(Slot::Question),
                Segment::Literal("\n".into()),
            ],
        }
    }
}

impl PromptTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TemplateError`] if the template names a slot other
    /// than `context` or `question`, omits either of them, or has an
    /// unbalanced brace.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(RagError::TemplateError(format!("unclosed slot '{{{name}'")));
                    }
                    let slot = Slot::from_name(name.trim()).ok_or_else(|| {
                        RagError::TemplateError(format!(
                            "unknown slot '{name}' (only 'context' and 'question' are allowed)"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                '}' => {
                    return Err(RagError::TemplateError(
                        "unmatched '}' (use '}}' for a literal brace)".to_string(),
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for slot in [Slot::Context, Slot::Question] {
            if !segments.contains(&Segment::Slot(slot)) {
                return Err(RagError::TemplateError(format!(
                    "template is missing the '{}' slot",
                    slot.name()
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Render the template with the given context and question.
    ///
    /// Empty strings are valid values.
    pub fn render<'a>(&self, context: impl Into<PromptContext<'a>>, question: &str) -> Prompt {
        let context = match context.into() {
            PromptContext::Text(text) => text.to_string(),
            PromptContext::Retrieved(result) => result.joined_text(),
        };
        self.render_with(|slot| match slot {
            Slot::Context => context.as_str(),
            Slot::Question => question,
        })
    }

    /// Render from a map of slot name to value.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TemplateError`] if a value for either slot is
    /// missing. Extra keys are ignored.
    pub fn render_values(&self, values: &HashMap<String, String>) -> Result<Prompt> {
        let lookup = |slot: Slot| {
            values.get(slot.name()).ok_or_else(|| {
                RagError::TemplateError(format!("missing value for slot '{}'", slot.name()))
            })
        };
        let context = lookup(Slot::Context)?;
        let question = lookup(Slot::Question)?;
        Ok(self.render(context, question))
    }

    fn render_with<'v>(&self, value: impl Fn(Slot) -> &'v str) -> Prompt {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(slot) => out.push_str(value(*slot)),
            }
        }
        Prompt(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, ScoredChunk};

    #[test]
    fn default_matches_parsed_default_template() {
        assert_eq!(PromptTemplate::parse(DEFAULT_TEMPLATE).unwrap(), PromptTemplate::default());
    }

    #[test]
    fn renders_default_template_exactly() {
        let prompt = PromptTemplate::default().render("sample", "Is it AI?");
        assert_eq!(
            prompt.as_str(),
            "Given the following context:\nsample\n\nAnswer the question:\nIs it AI?\n"
        );
    }

    #[test]
    fn empty_values_are_valid() {
        let prompt = PromptTemplate::default().render("", "");
        assert_eq!(prompt.as_str(), "Given the following context:\n\n\nAnswer the question:\n\n");
    }

    #[test]
    fn slot_text_inside_values_is_not_expanded() {
        let prompt = PromptTemplate::default().render("{question}", "q");
        assert!(prompt.as_str().contains("context:\n{question}\n"));
    }

    #[test]
    fn rejects_unknown_and_missing_slots() {
        assert!(matches!(
            PromptTemplate::parse("{context} {question} {history}"),
            Err(RagError::TemplateError(_))
        ));
        assert!(matches!(PromptTemplate::parse("{context} only"), Err(RagError::TemplateError(_))));
        assert!(matches!(
            PromptTemplate::parse("{context} {question"),
            Err(RagError::TemplateError(_))
        ));
        assert!(matches!(
            PromptTemplate::parse("{context} } {question}"),
            Err(RagError::TemplateError(_))
        ));
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = PromptTemplate::parse("{{json}} {context}/{question}").unwrap();
        assert_eq!(template.render("c", "q").as_str(), "{json} c/q");
    }

    #[test]
    fn render_values_requires_both_slots() {
        let template = PromptTemplate::default();
        let mut values = HashMap::new();
        values.insert("context".to_string(), "doc".to_string());
        assert!(matches!(template.render_values(&values), Err(RagError::TemplateError(_))));

        values.insert("question".to_string(), String::new());
        let prompt = template.render_values(&values).unwrap();
        assert!(prompt.as_str().starts_with("Given the following context:\ndoc\n"));
    }

    #[test]
    fn retrieved_context_joins_passages() {
        let result = RetrievalResult::new(vec![
            ScoredChunk { chunk: Chunk { position: 0, text: "A".into() }, score: 1.0 },
            ScoredChunk { chunk: Chunk { position: 1, text: "B".into() }, score: 0.5 },
        ]);
        let prompt = PromptTemplate::parse("{context}|{question}").unwrap().render(&result, "q");
        assert_eq!(prompt.as_str(), "A\n\nB|q");
    }
}
