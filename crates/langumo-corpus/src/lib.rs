//! langumo corpus - text-specific stages for building language-model corpora
//!
//! Raw formats are read by [`Parser`] implementations, grouped into
//! sentence lines by [`ParseRawFile`], and turned into WordPiece subwords by
//! [`TrainTokenizer`] and [`TokenizeSentences`].

pub mod parser;
pub mod parsers;
pub mod parsing;
pub mod reader;
pub mod sentence;
pub mod tokenization;

pub use parser::{PARSER_NAMES, Parser, parser_by_name};
pub use parsers::{EscapedStringParser, PlainTextParser};
pub use parsing::ParseRawFile;
pub use sentence::SentenceSplitter;
pub use tokenization::{TokenizeSentences, TrainTokenizer};
