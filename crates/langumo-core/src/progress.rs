//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per long-running stage (cleared on finish).
//! Non-TTY mode: hidden bars; stages log a summary line instead.

use std::io::IsTerminal;
use std::sync::{Arc, OnceLock};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

static INSTALLED: OnceLock<SharedProgress> = OnceLock::new();

/// Counting bar for stages that walk a known number of items
fn task_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {bar:30.green/dim} {human_pos:>10}/{human_len:10} {eta:>4}")
        .expect("invalid template")
        .progress_chars("--")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Bar counting up to `total`; hidden off-TTY.
    pub fn task_bar(&self, label: &str, total: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(task_style());
        pb.set_prefix(label.to_string());
        pb
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Make `ctx` the context stages draw their bars on. First call wins.
pub fn install(ctx: SharedProgress) {
    if INSTALLED.set(ctx).is_err() {
        log::debug!("progress context already installed");
    }
}

/// Bar on the installed context, or a hidden one when none is installed.
pub fn task_bar(label: &str, total: u64) -> ProgressBar {
    match INSTALLED.get() {
        Some(ctx) => ctx.task_bar(label, total),
        None => ProgressBar::hidden(),
    }
}

/// Whether an installed context draws to a TTY.
pub fn is_interactive() -> bool {
    INSTALLED.get().is_some_and(|ctx| ctx.is_tty())
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
