//! Raw corpus files to grouped sentence lines

use std::io::Write;

use anyhow::Result;

use langumo_core::progress::fmt_num;
use langumo_core::{BuildError, Output, Resource, ResourceManager, Stage, WorkerPool};

use crate::parser::{Documents, Parser};
use crate::sentence::SentenceSplitter;

pub const DEFAULT_NEWLINE_TOKEN: &str = "[NEWLINE]";

/// Parse raw files into one line per sentence group.
///
/// Sentences of a document are packed into a group until the group's total
/// length exceeds `max_len`, at which point it is emitted as one line.
/// Paragraph breaks inside a group become the newline token. A document's
/// leftover group is kept only when its length lies strictly between
/// `min_len` and `max_len`. Lengths count characters.
pub struct ParseRawFile {
    parser: Box<dyn Parser>,
    splitter: SentenceSplitter,
    min_len: usize,
    max_len: usize,
    newline: String,
    workers: usize,
}

impl ParseRawFile {
    pub fn new(parser: Box<dyn Parser>, language: &str) -> Self {
        Self {
            parser,
            splitter: SentenceSplitter::new(language),
            min_len: 0,
            max_len: 1024,
            newline: DEFAULT_NEWLINE_TOKEN.to_string(),
            workers: 1,
        }
    }

    pub fn with_lengths(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    pub fn with_newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = newline.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Group the sentences of one parsed document into output lines.
    fn group(&self, parsed: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut group: Vec<&str> = Vec::new();
        let mut group_len = 0;

        for paragraph in parsed.lines() {
            for sentence in self.splitter.split(paragraph) {
                group.push(sentence);
                group_len += sentence.chars().count();

                if group_len > self.max_len {
                    lines.push(group.join(" "));
                    group.clear();
                    group_len = 0;
                }
            }

            if !group.is_empty() {
                group.push(&self.newline);
                group_len += self.newline.chars().count();
            }
        }

        if group.last() == Some(&self.newline.as_str()) {
            group.pop();
        }

        let rest = group.join(" ");
        let rest_len = rest.chars().count();
        if rest_len > self.min_len && rest_len < self.max_len {
            lines.push(rest);
        }
        lines
    }
}

impl Stage for ParseRawFile {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        if inputs.is_empty() {
            return Err(BuildError::CountMismatch {
                stage: self.name().to_string(),
                expected: 1,
                actual: 0,
            }
            .into());
        }
        if self.min_len >= self.max_len {
            return Err(BuildError::InvalidArgument(format!(
                "min length {} must be below max length {}",
                self.min_len, self.max_len
            ))
            .into());
        }
        let pool = WorkerPool::new(self.workers)?;

        let parsed = rm.create()?;
        log::info!(
            "parse raw-formatted corpus file with {} ({} workers, language {})",
            self.parser.name(),
            pool.workers(),
            self.splitter.language()
        );

        let parser = self.parser.as_ref();
        let documents = inputs.iter().flat_map(move |raw| -> Documents {
            match parser.extract(raw) {
                Ok(docs) => docs,
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        });

        let mut dst = parsed.create()?;
        let summary = pool.run(
            documents,
            |doc| Ok(self.group(&self.parser.parse(doc)?)),
            &mut dst,
        )?;
        dst.flush()?;

        log::info!(
            "parsed {} documents into {} lines",
            fmt_num(summary.documents),
            fmt_num(summary.lines)
        );
        Ok(parsed.into())
    }
}
