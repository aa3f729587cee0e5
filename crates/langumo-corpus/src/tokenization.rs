//! WordPiece vocabulary training and sentence tokenization

use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::wordpiece::{WordPiece, WordPieceTrainer};
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{AddedToken, Model, TokenizerBuilder, TokenizerImpl};

use langumo_core::lines::{count_lines, read_line};
use langumo_core::progress::{self, fmt_num};
use langumo_core::shutdown;
use langumo_core::{BuildError, Output, Resource, ResourceManager, Stage};

type BertWordPiece =
    TokenizerImpl<WordPiece, BertNormalizer, BertPreTokenizer, PostProcessorWrapper, DecoderWrapper>;

pub const DEFAULT_UNK_TOKEN: &str = "[UNK]";

/// BERT normalisation: clean text, split CJK characters, lowercase, keep
/// accents.
fn bert_tokenizer(model: WordPiece) -> Result<BertWordPiece> {
    TokenizerBuilder::new()
        .with_model(model)
        .with_normalizer(Some(BertNormalizer::new(true, true, Some(false), true)))
        .with_pre_tokenizer(Some(BertPreTokenizer))
        .with_post_processor(None)
        .with_decoder(None)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to assemble WordPiece tokenizer: {e}"))
}

fn added_tokens<'a>(tokens: impl IntoIterator<Item = &'a String>) -> Vec<AddedToken> {
    tokens
        .into_iter()
        .map(|t| AddedToken::from(t.clone(), true))
        .collect()
}

fn expect_inputs(stage: &str, inputs: &[Resource], expected: usize) -> Result<()> {
    if inputs.len() != expected {
        return Err(BuildError::CountMismatch {
            stage: stage.to_string(),
            expected,
            actual: inputs.len(),
        }
        .into());
    }
    Ok(())
}

/// Train a WordPiece vocabulary on (a prefix of) a corpus.
///
/// Whole lines are copied into a training subset until more than
/// `subset_size` bytes have been read. The output is a `vocab.txt`-style
/// file with one token per line.
#[derive(Debug, Clone)]
pub struct TrainTokenizer {
    pub vocab_size: usize,
    pub subset_size: u64,
    pub limit_alphabet: usize,
    pub unk_token: String,
    pub special_tokens: Vec<String>,
}

impl Default for TrainTokenizer {
    fn default() -> Self {
        Self {
            vocab_size: 32_000,
            subset_size: 512_000_000,
            limit_alphabet: 6_000,
            unk_token: DEFAULT_UNK_TOKEN.to_string(),
            special_tokens: Vec::new(),
        }
    }
}

impl TrainTokenizer {
    fn create_subset(&self, rm: &mut ResourceManager, corpus: &Resource) -> Result<Resource> {
        let subset = rm.create()?;
        let mut src = corpus.open()?;
        let mut dst = subset.create()?;
        let mut line = Vec::new();
        let mut read = 0u64;
        while read_line(&mut src, &mut line)? {
            dst.write_all(&line)?;
            read += line.len() as u64;
            if read > self.subset_size {
                break;
            }
        }
        dst.flush()?;
        log::debug!("tokenizer training subset: {} bytes", fmt_num(read));
        Ok(subset)
    }
}

impl Stage for TrainTokenizer {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        expect_inputs(self.name(), inputs, 1)?;
        let subset = self.create_subset(rm, &inputs[0])?;
        log::info!(
            "train WordPiece tokenizer with {} tokens",
            fmt_num(self.vocab_size as u64)
        );

        let mut tokenizer = bert_tokenizer(WordPiece::default())?;
        let mut trainer = WordPieceTrainer::builder()
            .vocab_size(self.vocab_size)
            .min_frequency(2)
            .show_progress(progress::is_interactive())
            .limit_alphabet(self.limit_alphabet)
            .special_tokens(added_tokens(
                std::iter::once(&self.unk_token).chain(&self.special_tokens),
            ))
            .continuing_subword_prefix("##".to_string())
            .build();

        let subset_path = subset.path().to_string_lossy().into_owned();
        tokenizer
            .train_from_files(&mut trainer, vec![subset_path])
            .map_err(|e| anyhow::anyhow!("failed to train WordPiece tokenizer: {e}"))?;

        let vocab = rm.create()?;
        let saved = tokenizer
            .get_model()
            .save(rm.workspace(), Some("wordpiece"))
            .map_err(|e| anyhow::anyhow!("failed to save WordPiece vocabulary: {e}"))?;
        let saved = saved
            .into_iter()
            .next()
            .context("WordPiece model saved no vocabulary file")?;
        fs::rename(&saved, vocab.path()).with_context(|| {
            format!("failed to move {} into the workspace", saved.display())
        })?;

        Ok(vocab.into())
    }
}

/// Encode every corpus line with a WordPiece vocabulary.
///
/// Inputs are `(corpus, vocabulary)`. Each output line holds the subword
/// tokens of the matching input line, joined by spaces.
#[derive(Debug, Clone)]
pub struct TokenizeSentences {
    pub unk_token: String,
    pub special_tokens: Vec<String>,
    pub batch_size: usize,
}

impl Default for TokenizeSentences {
    fn default() -> Self {
        Self {
            unk_token: DEFAULT_UNK_TOKEN.to_string(),
            special_tokens: Vec::new(),
            batch_size: 10_000,
        }
    }
}

impl TokenizeSentences {
    fn load(&self, vocab: &Resource) -> Result<BertWordPiece> {
        let vocab_path = vocab.path().to_string_lossy().into_owned();
        let model = WordPiece::from_file(&vocab_path)
            .unk_token(self.unk_token.clone())
            .continuing_subword_prefix("##".to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to load vocabulary {vocab_path}: {e}"))?;

        let mut tokenizer = bert_tokenizer(model)?;
        tokenizer.add_special_tokens(&added_tokens(
            self.special_tokens.iter().chain(std::iter::once(&self.unk_token)),
        ));
        Ok(tokenizer)
    }

    fn flush_batch(
        &self,
        tokenizer: &BertWordPiece,
        batch: &mut Vec<String>,
        dst: &mut impl Write,
    ) -> Result<()> {
        let encodings = tokenizer
            .encode_batch(std::mem::take(batch), false)
            .map_err(|e| anyhow::anyhow!("failed to tokenize sentences: {e}"))?;
        for encoding in encodings {
            dst.write_all(encoding.get_tokens().join(" ").as_bytes())?;
            dst.write_all(b"\n")?;
        }
        Ok(())
    }
}

impl Stage for TokenizeSentences {
    fn build(&self, rm: &mut ResourceManager, inputs: &[Resource]) -> Result<Output> {
        expect_inputs(self.name(), inputs, 2)?;
        if self.batch_size == 0 {
            return Err(BuildError::InvalidArgument("batch size must be at least 1".into()).into());
        }
        let (corpus, vocab) = (&inputs[0], &inputs[1]);
        let tokenizer = self.load(vocab)?;

        let total = count_lines(corpus.path())?;
        log::info!(
            "tokenize {} sentences with WordPiece model",
            fmt_num(total)
        );
        let pb = progress::task_bar("tokenize", total);

        let tokenized = rm.create()?;
        let mut src = corpus.open()?;
        let mut dst = tokenized.create()?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut line = Vec::new();
        while read_line(&mut src, &mut line)? {
            let text = String::from_utf8_lossy(&line);
            batch.push(text.trim_end_matches(['\n', '\r']).to_string());
            if batch.len() >= self.batch_size {
                shutdown::check()?;
                pb.inc(batch.len() as u64);
                self.flush_batch(&tokenizer, &mut batch, &mut dst)?;
            }
        }
        if !batch.is_empty() {
            pb.inc(batch.len() as u64);
            self.flush_batch(&tokenizer, &mut batch, &mut dst)?;
        }
        dst.flush()?;
        pb.finish_and_clear();

        Ok(tokenized.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = "[UNK]\n[PAD]\n[NEWLINE]\nhello\nworld\nun\n##believ\n##able\n!\n";

    fn workspace() -> (tempfile::TempDir, ResourceManager) {
        let dir = tempfile::tempdir().unwrap();
        let rm = ResourceManager::new(&dir.path().join("ws")).unwrap();
        (dir, rm)
    }

    fn write(rm: &mut ResourceManager, text: &str) -> Resource {
        let r = rm.create().unwrap();
        fs::write(r.path(), text).unwrap();
        r
    }

    #[test]
    fn encodes_line_by_line() {
        let (_dir, mut rm) = workspace();
        let corpus = write(&mut rm, "Hello world!\nunbelievable [NEWLINE] hello\n\nxyz\n");
        let vocab = write(&mut rm, VOCAB);

        let stage = TokenizeSentences {
            special_tokens: vec!["[NEWLINE]".into(), "[PAD]".into()],
            batch_size: 2,
            ..Default::default()
        };
        let out = stage.build(&mut rm, &[corpus, vocab]).unwrap().into_vec();
        let text = out[0].read_to_string().unwrap();
        assert_eq!(
            text,
            "hello world !\nun ##believ ##able [NEWLINE] hello\n\n[UNK]\n"
        );
        rm.close().unwrap();
    }

    #[test]
    fn tokenize_needs_corpus_and_vocab() {
        let (_dir, mut rm) = workspace();
        let corpus = write(&mut rm, "a\n");
        let err = TokenizeSentences::default()
            .build(&mut rm, &[corpus])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::CountMismatch { expected: 2, actual: 1, .. })
        ));
        rm.close().unwrap();
    }

    #[test]
    fn subset_stops_after_limit() {
        let (_dir, mut rm) = workspace();
        let corpus = write(&mut rm, "aaaa\nbbbb\ncccc\n");
        let stage = TrainTokenizer {
            subset_size: 6,
            ..Default::default()
        };
        let subset = stage.create_subset(&mut rm, &corpus).unwrap();
        assert_eq!(subset.read_to_string().unwrap(), "aaaa\nbbbb\n");
        rm.close().unwrap();
    }

    #[test]
    fn trains_vocabulary_with_special_tokens_first() {
        let (_dir, mut rm) = workspace();
        let line = "the quick brown fox jumps over the lazy dog\n";
        let corpus = write(&mut rm, &line.repeat(50));

        let stage = TrainTokenizer {
            vocab_size: 100,
            limit_alphabet: 100,
            special_tokens: vec!["[START]".into(), "[END]".into()],
            ..Default::default()
        };
        let out = stage.build(&mut rm, &[corpus]).unwrap().into_vec();
        assert_eq!(out.len(), 1);
        assert!(rm.contains(&out[0]));

        let vocab = out[0].read_to_string().unwrap();
        let tokens: Vec<&str> = vocab.lines().collect();
        assert_eq!(&tokens[..3], &["[UNK]", "[START]", "[END]"]);
        assert!(tokens.contains(&"the"));
        assert!(tokens.len() <= 100);
        rm.close().unwrap();
    }
}
