//! Documents stored as JSON string literals, one per line
//!
//! Escaping line breaks as `\n` lets multi-paragraph documents share a
//! line-delimited file:
//!
//! ```text
//! "First paragraph.\nSecond paragraph."
//! "Another document."
//! ```

use anyhow::{Context, Result};

use langumo_core::Resource;

use crate::parser::{clean_paragraphs, Documents, Parser};
use crate::reader::non_blank_lines;

#[derive(Debug, Default, Clone, Copy)]
pub struct EscapedStringParser;

impl EscapedStringParser {
    pub const NAME: &'static str = "escaped-string";
}

/// Decode the leading JSON string literal of `line`; anything after its
/// closing quote is ignored.
fn decode(line: &str) -> Result<String> {
    let mut values = serde_json::Deserializer::from_str(line.trim_start()).into_iter::<String>();
    match values.next() {
        Some(value) => value.context("malformed escaped string"),
        None => anyhow::bail!("empty escaped string document"),
    }
}

impl Parser for EscapedStringParser {
    fn extract(&self, raw: &Resource) -> Result<Documents> {
        Ok(Box::new(non_blank_lines(raw.path())?))
    }

    fn parse(&self, document: &str) -> Result<String> {
        Ok(clean_paragraphs(&decode(document)?))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
