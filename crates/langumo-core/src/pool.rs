//! Producer / worker / collector pool for document parsing
//!
//! One producer (the calling thread) feeds raw documents into a bounded
//! queue. `W` workers on a rayon pool parse documents and push the resulting
//! lines to a single results queue, then a `Done` sentinel. A collector thread
//! writes every line to the destination until it has seen `W` sentinels.
//!
//! Line order across workers is unspecified. Any worker or collector failure
//! aborts the whole run, and so does a shutdown request.

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::BuildError;
use crate::shutdown;

/// Documents buffered per worker before the producer blocks
const QUEUE_DEPTH: usize = 64;

enum Message {
    Line(String),
    Done,
    Failed(String),
}

/// Counters reported after a successful run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub documents: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, BuildError> {
        if workers == 0 {
            return Err(BuildError::InvalidArgument(
                "number of parse workers must be at least 1".into(),
            ));
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Parse every document from `documents` with `parse`, writing each
    /// resulting string to `dst` as a `\n`-terminated line.
    pub fn run<I, F, W>(&self, documents: I, parse: F, dst: &mut W) -> Result<PoolSummary>
    where
        I: Iterator<Item = Result<String>>,
        F: Fn(&str) -> Result<Vec<String>> + Sync,
        W: Write + Send,
    {
        let workers = self.workers;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("parse-{i}"))
            .build()
            .context("failed to build parse worker pool")?;

        let (doc_tx, doc_rx) = bounded::<String>(workers * QUEUE_DEPTH);
        let (msg_tx, msg_rx) = unbounded::<Message>();
        let abort_flag = AtomicBool::new(false);
        let abort = &abort_flag;
        let parse = &parse;

        std::thread::scope(|scope| {
            let collector = std::thread::Builder::new()
                .name("collector".into())
                .spawn_scoped(scope, move || {
                    let result = collect(msg_rx, workers, dst);
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    result
                })
                .context("failed to spawn collector")?;

            let produced = pool.in_place_scope(move |s| {
                for _ in 0..workers {
                    let doc_rx = doc_rx.clone();
                    let msg_tx = msg_tx.clone();
                    s.spawn(move |_| work(doc_rx, msg_tx, parse, abort));
                }
                drop(doc_rx);
                drop(msg_tx);
                produce(documents, doc_tx, abort)
            });

            let lines = collector
                .join()
                .map_err(|e| BuildError::Worker(format!("collector panicked: {}", panic_message(&*e))))?;

            // A collector failure explains why production stopped; report it first.
            let lines = lines?;
            let documents = produced?;
            Ok(PoolSummary { documents, lines })
        })
    }
}

fn produce<I>(documents: I, queue: Sender<String>, abort: &AtomicBool) -> Result<u64>
where
    I: Iterator<Item = Result<String>>,
{
    let mut count = 0u64;
    for doc in documents {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        if let Err(e) = shutdown::check() {
            abort.store(true, Ordering::Relaxed);
            return Err(e.into());
        }
        let doc = doc.context("failed to extract document")?;
        if queue.send(doc).is_err() {
            // every worker is gone; the collector holds the cause
            break;
        }
        count += 1;
    }
    Ok(count)
}

fn work<F>(docs: Receiver<String>, results: Sender<Message>, parse: &F, abort: &AtomicBool)
where
    F: Fn(&str) -> Result<Vec<String>> + Sync,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        for doc in docs.iter() {
            if abort.load(Ordering::Relaxed) || shutdown::is_shutdown_requested() {
                break;
            }
            for line in parse(&doc)? {
                if results.send(Message::Line(line)).is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }));

    let last = match outcome {
        Ok(Ok(())) => Message::Done,
        Ok(Err(e)) => {
            abort.store(true, Ordering::Relaxed);
            Message::Failed(format!("{e:#}"))
        }
        Err(payload) => {
            abort.store(true, Ordering::Relaxed);
            Message::Failed(format!("worker panicked: {}", panic_message(&*payload)))
        }
    };
    let _ = results.send(last);
}

fn collect<W: Write>(results: Receiver<Message>, workers: usize, dst: &mut W) -> Result<u64> {
    let mut done = 0;
    let mut lines = 0u64;
    while done < workers {
        match results.recv() {
            Ok(Message::Line(line)) => {
                dst.write_all(line.as_bytes())?;
                dst.write_all(b"\n")?;
                lines += 1;
            }
            Ok(Message::Done) => done += 1,
            Ok(Message::Failed(reason)) => return Err(BuildError::Worker(reason).into()),
            Err(_) => {
                return Err(BuildError::Worker(format!(
                    "results queue closed after {done} of {workers} workers finished"
                ))
                .into())
            }
        }
    }
    dst.flush()?;
    Ok(lines)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
