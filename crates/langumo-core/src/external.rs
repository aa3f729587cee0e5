//! Stages crossing the workspace boundary

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::error::BuildError;
use crate::resource::{Resource, ResourceManager};
use crate::stage::{Output, Stage};

/// Bring existing files into the build without handing them to the manager.
///
/// Imported files are never purged or deleted. Inputs are ignored.
pub struct Import {
    paths: Vec<PathBuf>,
}

impl Import {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl Stage for Import {
    fn build(&self, _rm: &mut ResourceManager, _inputs: &[Resource]) -> Result<Output> {
        let mut out = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            if !path.is_file() {
                anyhow::bail!("import: no such file: {}", path.display());
            }
            log::info!("import file from {}", path.display());
            out.push(Resource::external(path));
        }
        Ok(Output::Many(out))
    }
}

/// Copy each input to its export path and pass the inputs through unchanged.
pub struct Export {
    paths: Vec<PathBuf>,
}

impl Export {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl Stage for Export {
    fn build(&self, _rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        if inputs.len() != self.paths.len() {
            return Err(BuildError::CountMismatch {
                stage: self.name().to_string(),
                expected: self.paths.len(),
                actual: inputs.len(),
            }
            .into());
        }

        for (resource, path) in inputs.iter().zip(&self.paths) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            log::info!("export the processed file to {}", path.display());
            fs::copy(resource.path(), path).with_context(|| {
                format!(
                    "failed to export {} to {}",
                    resource.path().display(),
                    path.display()
                )
            })?;
        }
        Ok(inputs.to_vec().into())
    }
}
