//! Train/validation split

use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::error::BuildError;
use crate::lines::{count_lines, read_line};
use crate::progress::fmt_num;
use crate::resource::{Resource, ResourceManager};
use crate::stage::{Output, Stage};

/// Products this close to an integer count as that integer.
const RATIO_EPSILON: f64 = 1e-9;

/// Split a line file into `(train, validation)`.
///
/// The first `ceil(L * ratio)` lines go to validation, the rest to train.
/// Lines are copied verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Split {
    ratio: f64,
}

impl Split {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    fn validation_len(&self, total: u64) -> u64 {
        let exact = (total as f64) * self.ratio;
        let nearest = exact.round();
        if (exact - nearest).abs() <= RATIO_EPSILON * nearest.max(1.0) {
            nearest as u64
        } else {
            exact.ceil() as u64
        }
    }
}

impl Stage for Split {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        if !(0.0..1.0).contains(&self.ratio) {
            return Err(BuildError::InvalidArgument(format!(
                "validation ratio must be in [0, 1), got {}",
                self.ratio
            ))
            .into());
        }
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
        let val_len = self.validation_len(total);
        log::info!(
            "split validation corpus - {} of {} lines",
            fmt_num(val_len),
            fmt_num(total)
        );

        let train = rm.create()?;
        let validation = rm.create()?;

        let mut src = input.open()?;
        let mut line = Vec::new();
        let mut val_dst = validation.create()?;
        for _ in 0..val_len {
            if !read_line(&mut src, &mut line)? {
                break;
            }
            val_dst.write_all(&line)?;
        }
        val_dst.flush()?;

        let mut train_dst = train.create()?;
        io::copy(&mut src, &mut train_dst)?;
        train_dst.flush()?;

        Ok(Output::Many(vec![train, validation]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn split(ratio: f64, content: &str) -> (String, String) {
        let dir = tempfile::tempdir().unwrap();
        let mut rm = ResourceManager::new(&dir.path().join("ws")).unwrap();
        let input = rm.create().unwrap();
        fs::write(input.path(), content).unwrap();
        let out = Split::new(ratio).build(&mut rm, &[input]).unwrap().into_vec();
        assert_eq!(out.len(), 2);
        let texts = (
            out[0].read_to_string().unwrap(),
            out[1].read_to_string().unwrap(),
        );
        rm.close().unwrap();
        texts
    }

    #[test]
    fn validation_rounds_up() {
        let s = Split::new(0.1387);
        assert_eq!(s.validation_len(1000), 139);
        assert_eq!(Split::new(0.1).validation_len(5), 1);
        assert_eq!(Split::new(0.0).validation_len(100), 0);
    }

    #[test]
    fn float_error_does_not_add_a_line() {
        // 100 * 0.07 is 7.000000000000001 in binary floating point
        assert_eq!(Split::new(0.07).validation_len(100), 7);
        assert_eq!(Split::new(0.1).validation_len(30), 3);
        assert_eq!(Split::new(0.07).validation_len(101), 8);
    }

    #[test]
    fn splits_head_to_validation() {
        let (train, val) = split(0.5, "a\nb\nc\n");
        assert_eq!(val, "a\nb\n");
        assert_eq!(train, "c\n");
    }

    #[test]
    fn zero_ratio_gives_empty_validation() {
        let (train, val) = split(0.0, "a\nb");
        assert_eq!(val, "");
        assert_eq!(train, "a\nb");
    }

    #[test]
    fn empty_input() {
        assert_eq!(split(0.3, ""), (String::new(), String::new()));
    }

    #[test]
    fn ratio_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut rm = ResourceManager::new(&dir.path().join("ws")).unwrap();
        let input = rm.create().unwrap();
        fs::write(input.path(), "a\n").unwrap();
        for ratio in [1.0, 1.5, -0.1, f64::NAN] {
            let err = Split::new(ratio).build(&mut rm, &[input.clone()]).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<BuildError>(),
                Some(BuildError::InvalidArgument(_))
            ));
        }
        rm.close().unwrap();
    }
}
