//! Sentence splitting

use unicode_segmentation::UnicodeSegmentation;

/// Splits paragraphs into sentences on Unicode (UAX #29) sentence
/// boundaries.
///
/// The boundary rules are language independent, so the language code does
/// not change where sentences end. It only shows up in logs, and any code
/// other than [`DEFAULT_LANGUAGE`] gets a warning saying so.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    language: String,
}

pub const DEFAULT_LANGUAGE: &str = "en";

impl SentenceSplitter {
    pub fn new(language: impl Into<String>) -> Self {
        let language = language.into();
        if language != DEFAULT_LANGUAGE {
            log::warn!(
                "language '{language}' has no dedicated sentence rules; using Unicode boundaries"
            );
        }
        Self { language }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Sentences of `paragraph` in order, trimmed, empty pieces dropped.
    pub fn split<'a>(&self, paragraph: &'a str) -> impl Iterator<Item = &'a str> {
        paragraph
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
