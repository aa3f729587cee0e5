//! Interrupt support via an atomic flag
//!
//! Signal handlers only set the flag. Long-running loops poll it and fail
//! with [`BuildError::Interrupted`], which unwinds back to [`crate::run`]
//! so the workspace is still removed.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::BuildError;

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// `Err(Interrupted)` once shutdown was requested.
pub fn check() -> Result<(), BuildError> {
    if is_shutdown_requested() {
        Err(BuildError::Interrupted)
    } else {
        Ok(())
    }
}
