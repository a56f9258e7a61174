// Toxicity classification: trait-based abstraction over the local model.
//
// The ToxicityClassifier trait defines the interface. OnnxToxicityClassifier
// implements it with a local ONNX model fed by a TextVectorizer whose
// vocabulary is fitted from the reference corpus (or loaded from a file).

pub mod corpus;
pub mod labels;
pub mod onnx;
pub mod traits;
pub mod vectorizer;

use anyhow::Result;
use tracing::info;

use crate::config::Config;

/// Build the vectorizer the way the config asks for: from an exported
/// vocabulary file when one is set, otherwise by fitting the corpus.
pub fn build_vectorizer(config: &Config) -> Result<vectorizer::TextVectorizer> {
    match &config.vocabulary_path {
        Some(path) => {
            let vectorizer = vectorizer::TextVectorizer::load_vocabulary(
                path,
                config.max_features,
                config.sequence_length,
            )?;
            info!(
                path = %path.display(),
                vocab_size = vectorizer.vocab_size(),
                "Loaded vocabulary file"
            );
            Ok(vectorizer)
        }
        None => corpus::fit_vectorizer(
            &config.corpus_path,
            &config.corpus_column,
            config.max_features,
            config.sequence_length,
        ),
    }
}

/// Construct the classifier once for the process lifetime.
pub fn load_classifier(config: &Config) -> Result<onnx::OnnxToxicityClassifier> {
    let vectorizer = build_vectorizer(config)?;
    onnx::OnnxToxicityClassifier::load(&config.model_path, vectorizer, config.model_options)
}
