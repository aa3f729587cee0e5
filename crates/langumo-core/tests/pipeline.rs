//! End-to-end properties of the build engine on real files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use langumo_core::{
    run, BuildError, Chain, Export, ExternalShuffle, Import, Merge, Output, Parallel, Residual,
    Resource, ResourceManager, Split, Stage, StageExt, WorkerPool,
};

fn numbered(n: usize, trailing_newline: bool) -> String {
    let mut text = (0..n).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
    if trailing_newline {
        text.push('\n');
    }
    text
}

fn write_input(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn numeric_lines(path: &Path) -> Vec<usize> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.parse().unwrap())
        .collect()
}

#[test]
fn shuffle_preserves_line_multiset() {
    for best_seek_count in [10, 100, 1000] {
        for max_buckets in [64, 512] {
            for trailing in [true, false] {
                let dir = tempfile::tempdir().unwrap();
                let input = write_input(dir.path(), "input.txt", &numbered(1000, trailing));
                let output = dir.path().join("shuffled.txt");

                let pipeline = Chain::new(vec![
                    Import::new([&input]).boxed(),
                    ExternalShuffle::new(best_seek_count, max_buckets).boxed(),
                    Export::new([&output]).boxed(),
                ]);
                run(&pipeline, &dir.path().join("ws")).unwrap();

                let mut lines = numeric_lines(&output);
                lines.sort_unstable();
                assert_eq!(
                    lines,
                    (0..1000).collect::<Vec<_>>(),
                    "best_seek_count={best_seek_count} max_buckets={max_buckets} trailing={trailing}"
                );
            }
        }
    }
}

#[test]
fn split_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.txt", &numbered(1000, true));
    let train = dir.path().join("train.txt");
    let eval = dir.path().join("eval.txt");

    let pipeline = Chain::new(vec![
        Import::new([&input]).boxed(),
        Split::new(0.1387).boxed(),
        Export::new([&train, &eval]).boxed(),
    ]);
    run(&pipeline, &dir.path().join("ws")).unwrap();

    assert_eq!(numeric_lines(&eval), (0..139).collect::<Vec<_>>());
    assert_eq!(numeric_lines(&train), (139..1000).collect::<Vec<_>>());
}

#[test]
fn merge_shuffle_split_keeps_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_input(dir.path(), "a.txt", "0\n1\n2");
    let b = write_input(dir.path(), "b.txt", "3\n4\n5\n6\n7\n8\n9\n");
    let train = dir.path().join("out/train.txt");
    let eval = dir.path().join("out/eval.txt");

    let pipeline = Chain::new(vec![
        Import::new([&a, &b]).boxed(),
        Merge.boxed(),
        ExternalShuffle::new(3, 4).with_seed(11).boxed(),
        Split::new(0.2).boxed(),
        Export::new([&train, &eval]).boxed(),
    ]);
    let workspace = dir.path().join("ws");
    run(&pipeline, &workspace).unwrap();

    let mut all = numeric_lines(&train);
    assert_eq!(all.len(), 8);
    assert_eq!(numeric_lines(&eval).len(), 2);
    all.extend(numeric_lines(&eval));
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<_>>());

    assert!(!workspace.exists());
    assert!(a.exists() && b.exists());
}

#[test]
fn parallel_branches_feed_one_merge() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_input(dir.path(), "a.txt", "a1\na2\n");
    let b = write_input(dir.path(), "b.txt", "b1");
    let merged = dir.path().join("merged.txt");

    let pipeline = Chain::new(vec![
        Parallel::from_groups([
            vec![Import::new([&a]).boxed(), Merge.boxed()],
            vec![Import::new([&b]).boxed(), Merge.boxed()],
        ])
        .boxed(),
        Merge.boxed(),
        Export::new([&merged]).boxed(),
    ]);
    run(&pipeline, &dir.path().join("ws")).unwrap();

    assert_eq!(fs::read_to_string(&merged).unwrap(), "a1\na2\nb1\n");
}

/// Records how many files the workspace holds when it runs.
struct CountFiles(std::rc::Rc<std::cell::Cell<usize>>);

impl Stage for CountFiles {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        self.0.set(fs::read_dir(rm.workspace())?.count());
        Ok(inputs.to_vec().into())
    }
}

#[test]
fn intermediate_files_are_deleted_between_stages() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.txt", &numbered(200, true));
    let seen = std::rc::Rc::new(std::cell::Cell::new(usize::MAX));

    let pipeline = Chain::new(vec![
        Import::new([&input]).boxed(),
        // 8 buckets + 1 output while running
        ExternalShuffle::new(10, 8).boxed(),
        CountFiles(seen.clone()).boxed(),
    ]);
    run(&pipeline, &dir.path().join("ws")).unwrap();

    assert_eq!(seen.get(), 1);
}

#[test]
fn residual_keeps_corpus_next_to_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_input(dir.path(), "corpus.txt", "x\n");
    let vocab = write_input(dir.path(), "vocab.txt", "[UNK]\n");
    let corpus_out = dir.path().join("corpus.out");
    let vocab_out = dir.path().join("vocab.out");

    let pipeline = Chain::new(vec![
        Import::new([&corpus]).boxed(),
        Residual::new(vec![Import::new([&vocab]).boxed()]).boxed(),
        Export::new([&corpus_out, &vocab_out]).boxed(),
    ]);
    run(&pipeline, &dir.path().join("ws")).unwrap();

    assert_eq!(fs::read_to_string(&corpus_out).unwrap(), "x\n");
    assert_eq!(fs::read_to_string(&vocab_out).unwrap(), "[UNK]\n");
}

#[test]
fn existing_workspace_is_never_touched() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");
    fs::create_dir(&workspace).unwrap();
    let keep = write_input(&workspace, "keep.txt", "mine");

    let err = run(&Merge, &workspace).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::Workspace(_))
    ));
    assert_eq!(fs::read_to_string(keep).unwrap(), "mine");
}

#[test]
fn failed_build_still_removes_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "input.txt", "a\n");
    let workspace = dir.path().join("ws");

    let pipeline = Chain::new(vec![
        Import::new([&input]).boxed(),
        Merge.boxed(),
        Split::new(2.0).boxed(),
    ]);
    let err = run(&pipeline, &workspace).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidArgument(_))
    ));
    assert!(!workspace.exists());
}

/// Leaves a file in the workspace and then panics.
struct Crash;

impl Stage for Crash {
    fn build(&self, rm: &mut ResourceManager, _inputs: &[Resource]) -> Result<Output> {
        let r = rm.create()?;
        fs::write(r.path(), "partial")?;
        panic!("stage crashed");
    }
}

/// Runs its inputs through a worker pool whose parser panics on one line.
struct PanickingParse;

impl Stage for PanickingParse {
    fn build(&self, rm: &mut ResourceManager, _inputs: &[Resource]) -> Result<Output> {
        let out = rm.create()?;
        let docs = numbered(50, false);
        let mut dst = out.create()?;
        WorkerPool::new(2)?.run(
            docs.lines().map(|l| Ok(l.to_string())),
            |doc| {
                if doc == "3" {
                    panic!("cannot parse {doc}");
                }
                Ok(vec![doc.to_string()])
            },
            &mut dst,
        )?;
        Ok(out.into())
    }
}

#[test]
fn panicking_stage_still_removes_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");

    let pipeline = Chain::new(vec![Merge.boxed(), Crash.boxed()]);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        run(&pipeline, &workspace)
    }));
    assert!(outcome.is_err());
    assert!(!workspace.exists());

    // the same workspace is free for the next build
    run(&Merge, &workspace).unwrap();
}

#[test]
fn worker_panic_fails_build_and_removes_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("ws");

    let err = run(&PanickingParse, &workspace).unwrap_err();
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::Worker(reason)) => assert!(reason.contains("cannot parse 3")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!workspace.exists());
}
