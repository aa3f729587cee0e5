//! Build configuration loaded from TOML files
//!
//! Everything lives under a top-level `[langumo]` table. Keys the user leaves
//! out are filled from [`DEFAULTS`] by a recursive merge before the table is
//! deserialized.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Deserialize;

use langumo_corpus::PARSER_NAMES;

/// Default values for every optional key, in the same layout as a user file.
pub const DEFAULTS: &str = r#"
workspace = "tmp"

[outputs]
vocabulary = "build/vocab.txt"
train-corpus = "build/corpus.train.txt"
eval-corpus = "build/corpus.eval.txt"

[build.parsing]
num-workers = 1
language = "en"
newline-token = "[NEWLINE]"
min-length = 0
max-length = 1024

[build.splitting]
validation-ratio = 0.1

[build.shuffling]
best-seek-count = 100000
max-buckets = 1024

[build.tokenization]
subset-size = 1000000000
vocab-size = 32000
limit-alphabet = 1000
unk-token = "[UNK]"
special-tokens = ["[START]", "[END]", "[PAD]", "[NEWLINE]"]
"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub workspace: PathBuf,
    pub inputs: Vec<InputConfig>,
    pub outputs: OutputsConfig,
    pub build: BuildConfig,
}

/// One raw corpus; `path` may be a glob pattern.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub path: String,
    pub parser: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputsConfig {
    pub vocabulary: PathBuf,
    pub train_corpus: PathBuf,
    pub eval_corpus: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub parsing: ParsingConfig,
    pub splitting: SplittingConfig,
    pub shuffling: ShufflingConfig,
    pub tokenization: TokenizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParsingConfig {
    pub num_workers: usize,
    /// Shown in logs only; sentence boundaries follow Unicode rules for
    /// every language.
    pub language: String,
    pub newline_token: String,
    pub min_length: usize,
    pub max_length: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SplittingConfig {
    pub validation_ratio: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShufflingConfig {
    pub best_seek_count: usize,
    pub max_buckets: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenizationConfig {
    pub prebuilt_vocab: Option<PathBuf>,
    pub subset_size: u64,
    pub vocab_size: usize,
    pub limit_alphabet: usize,
    pub unk_token: String,
    pub special_tokens: Vec<String>,
}

/// Fill keys missing from `data` with the ones in `defaults`.
///
/// Tables present on both sides are merged recursively; any other value the
/// user set wins.
pub fn merge_defaults(data: &mut toml::Table, defaults: &toml::Table) {
    for (key, default) in defaults {
        match data.get_mut(key) {
            None => {
                data.insert(key.clone(), default.clone());
            }
            Some(toml::Value::Table(user)) => {
                if let toml::Value::Table(default) = default {
                    merge_defaults(user, default);
                }
            }
            Some(_) => {}
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut root: toml::Table = toml::from_str(content)?;
        let mut data = match root.remove("langumo") {
            Some(toml::Value::Table(table)) => table,
            Some(_) => anyhow::bail!("`langumo` must be a table"),
            None => anyhow::bail!("missing top-level [langumo] table"),
        };

        let defaults: toml::Table = toml::from_str(DEFAULTS)?;
        merge_defaults(&mut data, &defaults);

        let config: Config = toml::Value::Table(data).try_into()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("at least one entry in `inputs` is required");
        }
        for input in &self.inputs {
            if !PARSER_NAMES.contains(&input.parser.as_str()) {
                anyhow::bail!(
                    "unknown parser '{}' for {} (available: {})",
                    input.parser,
                    input.path,
                    PARSER_NAMES.join(", ")
                );
            }
        }

        let parsing = &self.build.parsing;
        if parsing.num_workers == 0 {
            anyhow::bail!("build.parsing.num-workers must be at least 1");
        }
        if parsing.min_length >= parsing.max_length {
            anyhow::bail!(
                "build.parsing.min-length ({}) must be below max-length ({})",
                parsing.min_length,
                parsing.max_length
            );
        }

        let ratio = self.build.splitting.validation_ratio;
        if !(0.0..1.0).contains(&ratio) {
            anyhow::bail!("build.splitting.validation-ratio must be in [0, 1), got {ratio}");
        }
        Ok(())
    }

    /// Resolved settings as a table for `--print-config`.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Setting").fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec!["Workspace", &self.workspace.display().to_string()]);
        for input in &self.inputs {
            table.add_row(vec![
                "Input",
                &format!("{} ({})", input.path, input.parser),
            ]);
        }
        table.add_row(vec![
            "Vocabulary",
            &self.outputs.vocabulary.display().to_string(),
        ]);
        table.add_row(vec![
            "Train corpus",
            &self.outputs.train_corpus.display().to_string(),
        ]);
        table.add_row(vec![
            "Eval corpus",
            &self.outputs.eval_corpus.display().to_string(),
        ]);

        let p = &self.build.parsing;
        table.add_row(vec!["Parse workers", &p.num_workers.to_string()]);
        table.add_row(vec!["Language", &p.language]);
        table.add_row(vec![
            "Sequence length",
            &format!("{}..{} chars", p.min_length, p.max_length),
        ]);
        table.add_row(vec!["Newline token", &p.newline_token]);

        let s = &self.build.shuffling;
        table.add_row(vec![
            "Shuffle",
            &format!("{} seeks, max {} buckets", s.best_seek_count, s.max_buckets),
        ]);
        table.add_row(vec![
            "Validation ratio",
            &self.build.splitting.validation_ratio.to_string(),
        ]);

        let t = &self.build.tokenization;
        let vocab = match &t.prebuilt_vocab {
            Some(path) => format!("prebuilt: {}", path.display()),
            None => format!(
                "train {} tokens on {} bytes",
                t.vocab_size, t.subset_size
            ),
        };
        table.add_row(vec!["Tokenizer", &vocab]);
        table.add_row(vec!["Unknown token", &t.unk_token]);
        table.add_row(vec!["Special tokens", &t.special_tokens.join(" ")]);
        table
    }
}
