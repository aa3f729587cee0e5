//! Built-in raw corpus formats

mod escaped;
mod plain;

pub use escaped::EscapedStringParser;
pub use plain::PlainTextParser;
