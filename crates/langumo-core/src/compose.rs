//! Combinators that build pipelines out of stages
//!
//! They only ever talk to [`Stage`] and [`ResourceManager`]; none of them
//! knows about any concrete stage.

use anyhow::Result;

use crate::resource::{Resource, ResourceManager};
use crate::shutdown;
use crate::stage::{Output, Stage};

/// Sequential composition: each stage consumes the previous one's outputs.
///
/// Runs one generation deeper than its caller and purges after every stage,
/// so files a stage created but did not return are gone before the next
/// stage starts. A pending shutdown stops the chain before the next stage.
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// A single stage is returned as-is, anything else becomes a chain.
    pub fn wrap(mut stages: Vec<Box<dyn Stage>>) -> Box<dyn Stage> {
        if stages.len() == 1 {
            if let Some(only) = stages.pop() {
                return only;
            }
        }
        Box::new(Self::new(stages))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for Chain {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        rm.scoped(|rm| {
            let mut outputs = inputs.to_vec();
            for stage in &self.stages {
                shutdown::check()?;
                outputs = stage.build(rm, &outputs)?.into_vec();
                rm.validate(stage.name(), &outputs)?;

                rm.lock_all(&outputs);
                rm.purge()?;
            }
            Ok(Output::Many(outputs))
        })
    }
}

/// Fan-out: every group gets the same inputs, outputs are concatenated in
/// group order.
///
/// Groups run one after another. After each group its outputs are adopted
/// into the current generation and, together with the shared inputs, locked
/// through a purge that clears whatever that group left behind.
pub struct Parallel {
    groups: Vec<Box<dyn Stage>>,
}

impl Parallel {
    pub fn new(groups: Vec<Box<dyn Stage>>) -> Self {
        Self { groups }
    }

    /// Groups of several stages are chained; single-stage groups are used
    /// directly.
    pub fn from_groups(groups: impl IntoIterator<Item = Vec<Box<dyn Stage>>>) -> Self {
        Self::new(groups.into_iter().map(Chain::wrap).collect())
    }
}

impl Stage for Parallel {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        let mut outputs: Vec<Resource> = Vec::new();
        for group in &self.groups {
            shutdown::check()?;
            let produced = group.build(rm, inputs)?.into_vec();
            rm.validate(group.name(), &produced)?;
            outputs.extend(produced);

            let keep: Vec<Resource> = inputs.iter().chain(&outputs).cloned().collect();
            rm.adopt(&keep);
            rm.lock_all(&keep);
            rm.purge()?;
        }
        Ok(Output::Many(outputs))
    }
}

/// Skip connection: returns its inputs followed by the wrapped stages'
/// outputs.
pub struct Residual {
    inner: Box<dyn Stage>,
}

impl Residual {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            inner: Chain::wrap(stages),
        }
    }
}

impl Stage for Residual {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        let mut outputs = inputs.to_vec();
        outputs.extend(self.inner.build(rm, inputs)?.into_vec());
        Ok(Output::Many(outputs))
    }
}
