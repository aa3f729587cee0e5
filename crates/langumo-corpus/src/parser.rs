//! Document parser interface and the shared text cleanup

use anyhow::Result;

use langumo_core::Resource;

use crate::parsers::{EscapedStringParser, PlainTextParser};

/// Lazy, finite stream of raw documents.
pub type Documents = Box<dyn Iterator<Item = Result<String>>>;

/// Turns one raw corpus format into cleaned paragraphs.
///
/// `extract` runs on the controlling thread. `parse` runs concurrently on
/// parse workers, so it must not depend on call order or shared state.
pub trait Parser: Send + Sync {
    /// Split a raw file into documents.
    fn extract(&self, raw: &Resource) -> Result<Documents>;

    /// Clean one document; paragraphs are joined by `\n`.
    fn parse(&self, document: &str) -> Result<String>;

    /// Name used in configuration files.
    fn name(&self) -> &'static str;
}

/// Names accepted by [`parser_by_name`].
pub const PARSER_NAMES: &[&str] = &[EscapedStringParser::NAME, PlainTextParser::NAME];

/// Look a parser up by its configuration name.
pub fn parser_by_name(name: &str) -> Result<Box<dyn Parser>> {
    match name {
        EscapedStringParser::NAME => Ok(Box::new(EscapedStringParser)),
        PlainTextParser::NAME => Ok(Box::new(PlainTextParser)),
        other => anyhow::bail!(
            "unknown parser '{other}' (available: {})",
            PARSER_NAMES.join(", ")
        ),
    }
}

/// Normalise whitespace and quotes line by line, dropping empty lines.
pub fn clean_paragraphs(text: &str) -> String {
    let mut cleaned = Vec::new();
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            continue;
        }
        cleaned.push(clean_line(line));
    }
    cleaned.join("\n")
}

fn clean_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev_space = false;
    for c in line.chars() {
        let c = match c {
            '\t' => ' ',
            '`' | '\u{b4}' | '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            c => c,
        };
        if c == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    out
}
