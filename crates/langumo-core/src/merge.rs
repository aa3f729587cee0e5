//! Concatenate line files into one

use std::io::Write;

use anyhow::{Context, Result};

use crate::lines::{read_line, write_terminated};
use crate::resource::{Resource, ResourceManager};
use crate::stage::{Output, Stage};

/// Merge all inputs into a single resource, in input order.
///
/// Every line written ends with `\n`, so the last line of one input never
/// fuses with the first line of the next.
#[derive(Debug, Default)]
pub struct Merge;

impl Stage for Merge {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        let merged = rm.create()?;
        log::info!("merge {} files into one", inputs.len());

        let mut dst = merged.create()?;
        let mut line = Vec::new();
        for src in inputs {
            let mut reader = src
                .open()
                .with_context(|| format!("failed to open {}", src.path().display()))?;
            while read_line(&mut reader, &mut line)? {
                write_terminated(&mut dst, &line)?;
            }
        }
        dst.flush()?;

        Ok(merged.into())
    }
}
