//! Assemble the corpus build from a resolved configuration

use std::path::PathBuf;

use anyhow::{Context, Result};

use langumo_core::{
    Chain, Export, ExternalShuffle, Import, Merge, Parallel, Residual, Split, Stage, StageExt,
};
use langumo_corpus::{ParseRawFile, TokenizeSentences, TrainTokenizer, parser_by_name};

use crate::config::{Config, InputConfig};

/// Files matched by an input's path pattern, sorted.
fn expand(input: &InputConfig) -> Result<Vec<PathBuf>> {
    let mut paths = glob::glob(&input.path)
        .with_context(|| format!("invalid input pattern: {}", input.path))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to expand {}", input.path))?;
    paths.retain(|p| p.is_file());
    if paths.is_empty() {
        anyhow::bail!("no input files match {}", input.path);
    }
    paths.sort();
    Ok(paths)
}

fn parse_group(config: &Config, input: &InputConfig) -> Result<Vec<Box<dyn Stage>>> {
    let paths = expand(input)?;
    log::debug!("{} -> {} files", input.path, paths.len());

    let p = &config.build.parsing;
    let parse = ParseRawFile::new(parser_by_name(&input.parser)?, &p.language)
        .with_lengths(p.min_length, p.max_length)
        .with_newline(p.newline_token.clone())
        .with_workers(p.num_workers);
    Ok(vec![Import::new(paths).boxed(), parse.boxed()])
}

/// Parse every input, then merge, shuffle, tokenize and split into the
/// configured output files. The vocabulary is either imported or trained.
pub fn build(config: &Config) -> Result<Box<dyn Stage>> {
    let groups = config
        .inputs
        .iter()
        .map(|input| parse_group(config, input))
        .collect::<Result<Vec<_>>>()?;

    let t = &config.build.tokenization;
    let vocabulary: Box<dyn Stage> = match &t.prebuilt_vocab {
        Some(path) => Import::new([path]).boxed(),
        None => TrainTokenizer {
            vocab_size: t.vocab_size,
            subset_size: t.subset_size,
            limit_alphabet: t.limit_alphabet,
            unk_token: t.unk_token.clone(),
            special_tokens: t.special_tokens.clone(),
        }
        .boxed(),
    };

    let s = &config.build.shuffling;
    let o = &config.outputs;
    Ok(Chain::new(vec![
        Parallel::from_groups(groups).boxed(),
        Merge.boxed(),
        ExternalShuffle::new(s.best_seek_count, s.max_buckets).boxed(),
        Residual::new(vec![vocabulary, Export::new([&o.vocabulary]).boxed()]).boxed(),
        TokenizeSentences {
            unk_token: t.unk_token.clone(),
            special_tokens: t.special_tokens.clone(),
            ..Default::default()
        }
        .boxed(),
        Split::new(config.build.splitting.validation_ratio).boxed(),
        Export::new([&o.train_corpus, &o.eval_corpus]).boxed(),
    ])
    .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const VOCAB: &str = "[UNK]\n[START]\n[END]\n[PAD]\n[NEWLINE]\nthe\ncat\nsat\n.\n";

    fn config(dir: &Path, extra: &str) -> Config {
        let content = format!(
            r#"
[langumo]
workspace = "{ws}"
inputs = [
    {{ path = "{raw}/*.txt", parser = "plain-text" }},
    {{ path = "{raw}/docs.json", parser = "escaped-string" }},
]

[langumo.outputs]
vocabulary = "{out}/vocab.txt"
train-corpus = "{out}/train.txt"
eval-corpus = "{out}/eval.txt"

[langumo.build.splitting]
validation-ratio = 0.25
{extra}
"#,
            ws = dir.join("ws").display(),
            raw = dir.join("raw").display(),
            out = dir.join("out").display(),
        );
        Config::from_toml(&content).unwrap()
    }

    fn write_raw(dir: &Path) {
        let raw = dir.join("raw");
        fs::create_dir_all(&raw).unwrap();
        fs::write(raw.join("a.txt"), "The cat sat.\nThe cat.\n").unwrap();
        fs::write(raw.join("b.txt"), "Sat.\n").unwrap();
        fs::write(raw.join("docs.json"), "\"The cat sat.\\nThe cat sat.\"\n").unwrap();
    }

    #[test]
    fn expand_sorts_and_requires_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path());
        let input = InputConfig {
            path: format!("{}/*.txt", dir.path().join("raw").display()),
            parser: "plain-text".into(),
        };
        let paths = expand(&input).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        let none = InputConfig {
            path: format!("{}/*.xml", dir.path().display()),
            parser: "plain-text".into(),
        };
        assert!(expand(&none).unwrap_err().to_string().contains("no input files"));
    }

    #[test]
    fn builds_corpus_with_prebuilt_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(dir.path());
        let vocab = dir.path().join("prebuilt.txt");
        fs::write(&vocab, VOCAB).unwrap();

        let config = config(
            dir.path(),
            &format!(
                "[langumo.build.tokenization]\nprebuilt-vocab = \"{}\"",
                vocab.display()
            ),
        );
        let pipeline = build(&config).unwrap();
        langumo_core::run(pipeline.as_ref(), &config.workspace).unwrap();

        let out = dir.path().join("out");
        assert_eq!(fs::read_to_string(out.join("vocab.txt")).unwrap(), VOCAB);

        let train = fs::read_to_string(out.join("train.txt")).unwrap();
        let eval = fs::read_to_string(out.join("eval.txt")).unwrap();
        assert_eq!(eval.lines().count(), 1);
        assert_eq!(train.lines().count(), 3);

        let mut lines: Vec<&str> = train.lines().chain(eval.lines()).collect();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "sat .",
                "the cat .",
                "the cat sat .",
                "the cat sat . [NEWLINE] the cat sat .",
            ]
        );
        assert!(!config.workspace.exists());
    }

    #[test]
    fn missing_input_fails_before_building() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "");
        assert!(build(&config).is_err());
        assert!(!config.workspace.exists());
    }
}
