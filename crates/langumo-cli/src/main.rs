//! langumo - build language-model training corpora from raw text
//!
//! Parses raw corpora, shuffles them out of core, builds (or imports) a
//! WordPiece vocabulary and writes tokenized train/eval splits.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use langumo_core::shutdown::shutdown_flag;

mod config;
mod pipeline;

use config::Config;

#[derive(Parser)]
#[command(name = "langumo")]
#[command(about = "Build language-model corpora from raw text")]
#[command(version)]
struct Cli {
    /// Build configuration file
    #[arg(default_value = "build.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Show the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(langumo_core::ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    langumo_core::init_logging(cli.quiet, cli.debug, multi);
    langumo_core::progress::install(progress.clone());

    let config = Config::from_file(&cli.config)?;

    if cli.print_config {
        eprintln!("\n{}", config.to_table());
        return Ok(());
    }

    let pipeline = pipeline::build(&config)?;
    setup_signal_handler()?;

    let start = Instant::now();
    langumo_core::run(pipeline.as_ref(), &config.workspace)?;
    log::info!(
        "corpus built in {:.1}s: {}, {}, {}",
        start.elapsed().as_secs_f64(),
        config.outputs.vocabulary.display(),
        config.outputs.train_corpus.display(),
        config.outputs.eval_corpus.display()
    );
    Ok(())
}

fn setup_signal_handler() -> Result<()> {
    // First signal: set the shutdown flag so the build unwinds and removes
    // its workspace. Second signal: exit immediately.
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .context("Failed to register SIGTERM handler")?;
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        })
        .context("Failed to register SIGINT handler")?;
    }
    Ok(())
}
