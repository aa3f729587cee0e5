//! External-memory approximate line shuffle
//!
//! The input is cut into chunks of `S` consecutive lines. Chunks are visited
//! in random order (one seek each) and every line of a visited chunk is
//! appended to a uniformly chosen bucket file. Concatenating the buckets gives
//! the output. Memory use is bounded by the chunk offset table.
//!
//! `best_seek_count` controls the number of seeks; `max_buckets` caps the disk
//! fan-out. Fewer buckets than `2 * S` coarsens the shuffle: lines from one
//! chunk land closer together in the output.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::BuildError;
use crate::lines::{count_lines, read_line, write_terminated};
use crate::progress::{self, fmt_num};
use crate::resource::{Resource, ResourceManager};
use crate::shutdown;
use crate::stage::{Output, Stage};

pub const DEFAULT_BEST_SEEK_COUNT: usize = 100_000;
pub const DEFAULT_MAX_BUCKETS: usize = 512;

/// Shuffle the lines of a single input resource.
#[derive(Debug, Clone)]
pub struct ExternalShuffle {
    best_seek_count: usize,
    max_buckets: usize,
    seed: Option<u64>,
}

impl Default for ExternalShuffle {
    fn default() -> Self {
        Self::new(DEFAULT_BEST_SEEK_COUNT, DEFAULT_MAX_BUCKETS)
    }
}

impl ExternalShuffle {
    pub fn new(best_seek_count: usize, max_buckets: usize) -> Self {
        Self {
            best_seek_count,
            max_buckets,
            seed: None,
        }
    }

    /// Fix the random source, making the output reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn check(&self) -> Result<(), BuildError> {
        if self.best_seek_count == 0 {
            return Err(BuildError::InvalidArgument(
                "best seek count must be at least 1".into(),
            ));
        }
        if self.max_buckets == 0 {
            return Err(BuildError::InvalidArgument(
                "max buckets must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Number of lines per chunk for `total` lines.
fn stride(total: u64, best_seek_count: usize) -> u64 {
    (total / best_seek_count as u64).max(1)
}

/// Byte offsets of every chunk start, including a final partial chunk.
fn chunk_offsets(reader: &mut BufReader<File>, stride: u64) -> io::Result<Vec<u64>> {
    let mut offsets = Vec::new();
    let mut line = Vec::new();
    let mut pos = 0u64;
    let mut index = 0u64;
    while read_line(reader, &mut line)? {
        if index % stride == 0 {
            offsets.push(pos);
        }
        pos += line.len() as u64;
        index += 1;
    }
    Ok(offsets)
}

impl Stage for ExternalShuffle {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        self.check()?;
        let [input] = inputs else {
            return Err(BuildError::CountMismatch {
                stage: self.name().to_string(),
                expected: 1,
                actual: inputs.len(),
            }
            .into());
        };

        let total = count_lines(input.path())
            .with_context(|| format!("failed to count lines of {}", input.path().display()))?;
        let stride = stride(total, self.best_seek_count);

        let mut reader = input
            .open()
            .with_context(|| format!("failed to open {}", input.path().display()))?;
        let mut offsets = chunk_offsets(&mut reader, stride)?;

        let mut rng = self.rng();
        offsets.shuffle(&mut rng);

        let num_buckets = (stride.saturating_mul(2)).min(self.max_buckets as u64) as usize;
        log::info!(
            "shuffle {} lines in {} chunks of {} with {} buckets",
            fmt_num(total),
            fmt_num(offsets.len() as u64),
            stride,
            num_buckets
        );

        let buckets = (0..num_buckets)
            .map(|_| rm.create())
            .collect::<Result<Vec<_>>>()?;
        let mut writers = buckets
            .iter()
            .map(Resource::create)
            .collect::<io::Result<Vec<BufWriter<File>>>>()?;

        let pb = progress::task_bar("shuffle", offsets.len() as u64);
        let mut line = Vec::new();
        for &offset in &offsets {
            shutdown::check()?;
            reader.seek(SeekFrom::Start(offset))?;
            for _ in 0..stride {
                if !read_line(&mut reader, &mut line)? {
                    break;
                }
                let bucket = rng.gen_range(0..num_buckets);
                write_terminated(&mut writers[bucket], &line)?;
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        for w in &mut writers {
            w.flush()?;
        }
        drop(writers);

        let shuffled = rm.create()?;
        let mut dst = shuffled.create()?;
        for bucket in &buckets {
            let mut src = bucket.open()?;
            io::copy(&mut src, &mut dst)?;
        }
        dst.flush()?;

        Ok(shuffled.into())
    }
}
