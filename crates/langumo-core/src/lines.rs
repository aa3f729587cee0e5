//! Newline-delimited I/O shared by the line-oriented stages

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use memmap2::Mmap;

/// Count lines in a file; a final line without `\n` still counts.
pub fn count_lines(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(0);
    }

    // SAFETY: read-only map of a workspace or input file nobody writes while
    // the pipeline runs.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(count_in(&mmap))
}

fn count_in(bytes: &[u8]) -> u64 {
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u64;
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

/// Read one line including its terminator into `buf` (cleared first).
/// Returns `false` at end of input.
pub fn read_line(reader: &mut impl BufRead, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

/// Write `line`, adding `\n` if it does not already end with one.
pub fn write_terminated(writer: &mut impl Write, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    if !line.ends_with(b"\n") {
        writer.write_all(b"\n")?;
    }
    Ok(())
}
