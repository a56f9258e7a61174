// Reference corpus loader: fits the vocabulary from a CSV dataset.
//
// The corpus is the labelled training CSV the model was trained on. Only the
// text column is read; every row contributes to the token frequency table.
// This runs once at startup and is the slow part of bringing the bot up.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::vectorizer::{TextVectorizer, VocabularyBuilder};

/// Column holding the comment text in the reference dataset.
pub const DEFAULT_TEXT_COLUMN: &str = "comment_text";

/// Read every row of `path` and fit a vectorizer from the `column` texts.
pub fn fit_vectorizer(
    path: &Path,
    column: &str,
    max_tokens: usize,
    sequence_length: usize,
) -> Result<TextVectorizer> {
    if !path.exists() {
        anyhow::bail!(
            "Reference corpus not found: {}\n\
             Set CHATGUARD_CORPUS_PATH, or CHATGUARD_VOCAB_PATH to skip fitting.",
            path.display()
        );
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open corpus {}", path.display()))?;

    let column_index = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| {
            anyhow::anyhow!("Corpus {} has no `{}` column", path.display(), column)
        })?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} Fitting vocabulary: {pos} rows ({elapsed})")
            .expect("valid template"),
    );

    let mut builder = VocabularyBuilder::new();
    for (row, record) in reader.records().enumerate() {
        // Row numbers are 1-based after the header, matching what a
        // spreadsheet shows.
        let record = record.with_context(|| format!("Malformed corpus row {}", row + 2))?;
        if let Some(text) = record.get(column_index) {
            builder.add(text);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if builder.documents() == 0 {
        anyhow::bail!("Corpus {} has no rows", path.display());
    }

    let vectorizer = builder.build(max_tokens, sequence_length)?;

    info!(
        corpus = %path.display(),
        vocab_size = vectorizer.vocab_size(),
        sequence_length,
        "Vocabulary fitted from reference corpus"
    );

    Ok(vectorizer)
}
