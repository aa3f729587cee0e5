//! langumo core - staged, disk-backed corpus build engine
//!
//! Stages pass temporary files ([`Resource`]) to each other through a
//! [`ResourceManager`] that deletes them as soon as no later stage can see
//! them. Combinators ([`Chain`], [`Parallel`], [`Residual`]) wire stages into
//! a pipeline; [`run`] builds one inside a fresh workspace.

pub mod compose;
pub mod error;
pub mod external;
pub mod lines;
pub mod logging;
pub mod merge;
pub mod pool;
pub mod progress;
pub mod resource;
pub mod shuffle;
pub mod shutdown;
pub mod split;
pub mod stage;

// Re-exports for convenience
pub use compose::{Chain, Parallel, Residual};
pub use error::BuildError;
pub use external::{Export, Import};
pub use logging::{IndicatifLogger, init_logging};
pub use merge::Merge;
pub use pool::{PoolSummary, WorkerPool};
pub use progress::{ProgressContext, SharedProgress};
pub use resource::{Resource, ResourceManager};
pub use shuffle::ExternalShuffle;
pub use split::Split;
pub use stage::{Output, Stage, StageExt, run};
