use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Minimum characters a resolved source must have before generation.
pub const MIN_SOURCE_CHARS: usize = 50;

/// Hard cap on source characters embedded in any prompt.
pub const MAX_SOURCE_CHARS: usize = 30_000;

/// Where a source document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    Pasted,
    File,
    Url,
}

/// Exactly one user-supplied input to resolve into a document.
#[derive(Debug, Clone)]
pub enum SourceInput {
    Pasted(String),
    File(PathBuf),
    Url(String),
}

impl SourceInput {
    pub fn origin(&self) -> SourceOrigin {
        match self {
            SourceInput::Pasted(_) => SourceOrigin::Pasted,
            SourceInput::File(_) => SourceOrigin::File,
            SourceInput::Url(_) => SourceOrigin::Url,
        }
    }
}

/// Validated, length-capped text handed to the orchestrator.
///
/// Immutable once built; editing the input produces a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    text: String,
    origin: SourceOrigin,
    original_chars: usize,
}

impl SourceDocument {
    /// Trim, cap at [`MAX_SOURCE_CHARS`] and check the minimum length.
    pub fn new(text: &str, origin: SourceOrigin) -> Result<Self, DomainError> {
        let trimmed = text.trim();
        let original_chars = trimmed.chars().count();

        if original_chars < MIN_SOURCE_CHARS {
            return Err(DomainError::InsufficientContent {
                actual: original_chars,
                minimum: MIN_SOURCE_CHARS,
            });
        }

        Ok(Self {
            text: truncate_chars(trimmed, MAX_SOURCE_CHARS).to_string(),
            origin,
            original_chars,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> SourceOrigin {
        self.origin
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn was_truncated(&self) -> bool {
        self.original_chars > MAX_SOURCE_CHARS
    }
}

/// First `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_text() {
        let err = SourceDocument::new("   too short   ", SourceOrigin::Pasted).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientContent { actual: 9, minimum: 50 }
        ));
    }

    #[test]
    fn test_trims_and_keeps_text() {
        let text = format!("  {}  ", "a".repeat(60));
        let doc = SourceDocument::new(&text, SourceOrigin::File).unwrap();
        assert_eq!(doc.char_len(), 60);
        assert_eq!(doc.origin(), SourceOrigin::File);
        assert!(!doc.was_truncated());
    }

    #[test]
    fn test_truncates_to_cap() {
        let text = "é".repeat(MAX_SOURCE_CHARS + 500);
        let doc = SourceDocument::new(&text, SourceOrigin::Url).unwrap();
        assert_eq!(doc.char_len(), MAX_SOURCE_CHARS);
        assert_eq!(doc.byte_len(), MAX_SOURCE_CHARS * 2);
        assert!(doc.was_truncated());
    }

    #[test]
    fn test_truncate_chars_shorter_than_cap() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
