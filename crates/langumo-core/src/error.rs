//! Fatal error taxonomy for pipeline builds

/// Error raised by the build engine itself (as opposed to plain I/O).
///
/// Carried inside [`anyhow::Error`]; callers that need to tell the kinds
/// apart use `err.downcast_ref::<BuildError>()`. Nothing in the engine
/// retries on any of these.
#[derive(Debug)]
pub enum BuildError {
    /// A stage returned something that is not a live resource of this manager.
    Shape { stage: String, detail: String },
    /// Number of resources does not match what the stage was configured for.
    CountMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },
    /// Stage parameter outside its valid range.
    InvalidArgument(String),
    /// A parse worker or the collector failed.
    Worker(String),
    /// Workspace directory cannot be claimed.
    Workspace(String),
    /// Shutdown was requested by a signal.
    Interrupted,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shape { stage, detail } => write!(f, "{stage}: invalid output: {detail}"),
            Self::CountMismatch {
                stage,
                expected,
                actual,
            } => write!(f, "{stage}: expected {expected} resources, got {actual}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Worker(msg) => write!(f, "worker failed: {msg}"),
            Self::Workspace(msg) => write!(f, "workspace: {msg}"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for BuildError {}
