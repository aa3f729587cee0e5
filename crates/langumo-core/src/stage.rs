//! The unit of work and the top-level build entry point

use std::path::Path;

use anyhow::Result;

use crate::resource::{Resource, ResourceManager};

/// What a stage hands to whoever runs it next.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    None,
    Single(Resource),
    Many(Vec<Resource>),
}

impl Output {
    /// Flatten into an ordered list; `None` is the empty list.
    pub fn into_vec(self) -> Vec<Resource> {
        match self {
            Self::None => Vec::new(),
            Self::Single(r) => vec![r],
            Self::Many(rs) => rs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Many(rs) => rs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Resource> for Output {
    fn from(r: Resource) -> Self {
        Self::Single(r)
    }
}

impl From<Vec<Resource>> for Output {
    fn from(rs: Vec<Resource>) -> Self {
        Self::Many(rs)
    }
}

/// A pipeline stage: consumes resources, produces resources.
///
/// Stages create every file they write through `rm`. Anything they create
/// but do not return is deleted by the enclosing combinator once the stage
/// finishes.
pub trait Stage {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output>;

    /// Short name for logs and errors.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        (**self).build(rm, inputs)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// `stage.boxed()` instead of `Box::new(stage) as Box<dyn Stage>`.
pub trait StageExt: Stage + Sized + 'static {
    fn boxed(self) -> Box<dyn Stage> {
        Box::new(self)
    }
}

impl<S: Stage + Sized + 'static> StageExt for S {}

/// Build `stage` with no inputs inside a fresh workspace.
///
/// The workspace is removed afterwards whether the build succeeded or not;
/// the first error wins.
pub fn run(stage: &dyn Stage, workspace: &Path) -> Result<()> {
    let mut rm = ResourceManager::new(workspace)?;
    log::info!("build {} in {}", stage.name(), workspace.display());

    let result = stage
        .build(&mut rm, &[])
        .and_then(|_| rm.purge().map(|_| ()));
    let closed = rm.close();

    result?;
    closed
}
