//! One document per line

use anyhow::Result;

use langumo_core::Resource;

use crate::parser::{clean_paragraphs, Documents, Parser};
use crate::reader::non_blank_lines;

/// Plain UTF-8 text where every non-blank line is a document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub const NAME: &'static str = "plain-text";
}

impl Parser for PlainTextParser {
    fn extract(&self, raw: &Resource) -> Result<Documents> {
        Ok(Box::new(non_blank_lines(raw.path())?))
    }

    fn parse(&self, document: &str) -> Result<String> {
        Ok(clean_paragraphs(document))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
