// Text vectorizer: turns a message into the fixed-length id sequence the
// model was trained on.
//
// Reproduces the training pipeline's defaults: lowercase ASCII letters, strip
// ASCII punctuation, split on ASCII whitespace, look each token up in a frequency-ranked
// vocabulary, then truncate or zero-pad to the sequence length. Ids 0 and 1
// are reserved for padding and out-of-vocabulary tokens.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex_lite::Regex;
use tracing::debug;

/// Padding id, fills sequences shorter than the sequence length.
pub const PAD_ID: i64 = 0;
/// Out-of-vocabulary id, used for every token the vocabulary doesn't know.
pub const OOV_ID: i64 = 1;
/// Vocabulary entry for the OOV id in exported vocabulary files.
pub const OOV_TOKEN: &str = "[UNK]";

/// Number of reserved ids at the start of the vocabulary (padding + OOV).
const RESERVED: usize = 2;

/// Same character set the training-side standardizer strips.
static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"[!"#$%&()*+,\-./:;<=>?@\[\\\]^_`{|}~']"##).expect("valid punctuation regex")
});

/// Lowercase ASCII letters and strip punctuation. Non-ASCII characters pass
/// through untouched, so `Über` and `über` stay distinct tokens.
pub fn standardize(text: &str) -> String {
    PUNCTUATION
        .replace_all(&text.to_ascii_lowercase(), "")
        .into_owned()
}

/// C `isspace`: the ASCII whitespace set, vertical tab included. Unicode
/// spaces such as NBSP are part of a token.
fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0B' | '\x0C' | '\r')
}

/// Split standardized text into tokens on ASCII whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    standardize(text)
        .split(is_separator)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Counts token frequencies across a corpus, one document at a time.
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    counts: HashMap<String, u64>,
    documents: u64,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one document's tokens to the frequency table.
    pub fn add(&mut self, text: &str) {
        for token in tokenize(text) {
            *self.counts.entry(token).or_insert(0) += 1;
        }
        self.documents += 1;
    }

    /// Number of documents seen so far.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Rank tokens and freeze them into a vectorizer.
    ///
    /// Ranking is by descending frequency, ties broken by descending token
    /// order. Only the top `max_tokens - 2` tokens are kept, since the two
    /// reserved ids count against the limit.
    pub fn build(self, max_tokens: usize, sequence_length: usize) -> Result<TextVectorizer> {
        check_limits(max_tokens, sequence_length)?;

        let mut ranked: Vec<(String, u64)> = self.counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        ranked.truncate(max_tokens - RESERVED);

        debug!(
            documents = self.documents,
            kept = ranked.len(),
            "Fitted vocabulary"
        );

        let tokens = ranked.into_iter().map(|(token, _)| token).collect();
        TextVectorizer::from_tokens(tokens, max_tokens, sequence_length)
    }
}

/// Maps text to a fixed-length sequence of vocabulary ids.
#[derive(Debug, Clone)]
pub struct TextVectorizer {
    /// Corpus tokens in id order; token at position i has id i + 2.
    tokens: Vec<String>,
    index: HashMap<String, i64>,
    max_tokens: usize,
    sequence_length: usize,
}

impl TextVectorizer {
    /// Fit a vocabulary from an in-memory corpus.
    pub fn fit<I, S>(texts: I, max_tokens: usize, sequence_length: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = VocabularyBuilder::new();
        for text in texts {
            builder.add(text.as_ref());
        }
        builder.build(max_tokens, sequence_length)
    }

    /// Build a vectorizer from an exported vocabulary list.
    ///
    /// Accepts the list either with the reserved entries (`""`, `"[UNK]"`)
    /// at the front, as the training vectorizer exports it, or without them.
    pub fn from_vocabulary(
        mut vocabulary: Vec<String>,
        max_tokens: usize,
        sequence_length: usize,
    ) -> Result<Self> {
        if vocabulary.len() >= RESERVED && vocabulary[0].is_empty() && vocabulary[1] == OOV_TOKEN {
            vocabulary.drain(..RESERVED);
        }
        TextVectorizer::from_tokens(vocabulary, max_tokens, sequence_length)
    }

    fn from_tokens(tokens: Vec<String>, max_tokens: usize, sequence_length: usize) -> Result<Self> {
        check_limits(max_tokens, sequence_length)?;

        if tokens.len() + RESERVED > max_tokens {
            anyhow::bail!(
                "Vocabulary has {} entries but the limit is {}",
                tokens.len() + RESERVED,
                max_tokens
            );
        }

        let mut index = HashMap::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            if token.is_empty() || token.chars().any(is_separator) {
                anyhow::bail!("Invalid vocabulary token at position {}: {:?}", i, token);
            }
            if index.insert(token.clone(), (i + RESERVED) as i64).is_some() {
                anyhow::bail!("Duplicate vocabulary token: {token}");
            }
        }

        Ok(Self {
            tokens,
            index,
            max_tokens,
            sequence_length,
        })
    }

    /// Load a vocabulary file (one token per line).
    pub fn load_vocabulary(path: &Path, max_tokens: usize, sequence_length: usize) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Vocabulary file not found: {}", path.display());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary from {}", path.display()))?;

        // The padding entry is an empty first line; keep it so the reserved
        // prefix is recognised.
        let vocabulary: Vec<String> = contents.lines().map(str::to_string).collect();
        Self::from_vocabulary(vocabulary, max_tokens, sequence_length)
            .with_context(|| format!("Invalid vocabulary file {}", path.display()))
    }

    /// Write the full vocabulary (reserved entries included), one per line.
    pub fn save_vocabulary(&self, path: &Path) -> Result<()> {
        let mut contents = self.vocabulary().join("\n");
        contents.push('\n');
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write vocabulary to {}", path.display()))
    }

    /// The vocabulary in id order, starting with the padding and OOV entries.
    pub fn vocabulary(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.vocab_size());
        out.push("");
        out.push(OOV_TOKEN);
        out.extend(self.tokens.iter().map(String::as_str));
        out
    }

    /// Number of ids in use, reserved ids included.
    pub fn vocab_size(&self) -> usize {
        self.tokens.len() + RESERVED
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Id for a single already-standardized token.
    pub fn token_id(&self, token: &str) -> i64 {
        self.index.get(token).copied().unwrap_or(OOV_ID)
    }

    /// Convert text to exactly `sequence_length` ids.
    pub fn vectorize(&self, text: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = tokenize(text)
            .iter()
            .take(self.sequence_length)
            .map(|token| self.token_id(token))
            .collect();
        ids.resize(self.sequence_length, PAD_ID);
        ids
    }
}

fn check_limits(max_tokens: usize, sequence_length: usize) -> Result<()> {
    if max_tokens <= RESERVED {
        anyhow::bail!("max_tokens must be greater than {RESERVED}, got {max_tokens}");
    }
    if sequence_length == 0 {
        anyhow::bail!("sequence_length must be at least 1");
    }
    Ok(())
}
