//! Raw input readers with transparent gzip decoding

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;

/// Buffer size for raw corpus readers
const RAW_BUF_SIZE: usize = 256 * 1024;

/// Open a raw corpus file, gunzipping it when the name ends in `.gz`.
pub fn open_raw(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if is_gzip(path) {
        log::debug!("reading {} through gzip decoder", path.display());
        Ok(Box::new(BufReader::with_capacity(
            RAW_BUF_SIZE,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(RAW_BUF_SIZE, file)))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Lazily yield every non-blank line of `path`, without its terminator.
pub fn non_blank_lines(path: &Path) -> Result<impl Iterator<Item = Result<String>>> {
    let display = path.display().to_string();
    let lines = open_raw(path)?.lines();
    Ok(lines.filter_map(move |line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(Ok(line)),
        Err(e) => Some(Err(anyhow::Error::new(e).context(format!("failed to read {display}")))),
    }))
}
