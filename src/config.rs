use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::discord::client::DEFAULT_API_URL;
use crate::discord::gateway::DEFAULT_GATEWAY_URL;
use crate::toxicity::corpus::DEFAULT_TEXT_COLUMN;
use crate::toxicity::labels::DEFAULT_THRESHOLD;
use crate::toxicity::onnx::{InputEncoding, ModelOptions, OutputActivation};

/// Words kept in the vocabulary, padding and OOV entries included.
pub const DEFAULT_MAX_FEATURES: usize = 200_000;

/// Ids per vectorized message.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 1800;

/// Where the training CSV lives relative to the working directory.
pub const DEFAULT_CORPUS_PATH: &str = "jigsaw-toxic-comment-classification-challenge/train.csv";

pub const DEFAULT_GREETING: &str = "Hello! I'm monitoring for inappropriate comments.";

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Bot token used for both the REST API and the gateway.
    pub discord_token: String,
    /// Channel that gets the one-time greeting when the bot comes up.
    pub greeting_channel_id: Option<String>,
    pub greeting_message: String,
    /// Exported ONNX model file
    pub model_path: PathBuf,
    /// Reference CSV used to fit the vocabulary
    pub corpus_path: PathBuf,
    pub corpus_column: String,
    /// Pre-exported vocabulary; when set the corpus isn't read at all
    pub vocabulary_path: Option<PathBuf>,
    pub max_features: usize,
    pub sequence_length: usize,
    /// A label triggers when its probability is strictly above this
    pub threshold: f64,
    pub model_options: ModelOptions,
    pub api_url: String,
    pub gateway_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("greeting_channel_id", &self.greeting_channel_id)
            .field("model_path", &self.model_path)
            .field("corpus_path", &self.corpus_path)
            .field("vocabulary_path", &self.vocabulary_path)
            .field("max_features", &self.max_features)
            .field("sequence_length", &self.sequence_length)
            .field("threshold", &self.threshold)
            .field("model_options", &self.model_options)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything but the token has a default, so `classify` and
    /// `export-vocab` work without Discord credentials.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Treat empty values like unset ones; `.env` templates often leave
        // keys blank.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_options = ModelOptions {
            activation: match get("CHATGUARD_MODEL_OUTPUT").as_deref() {
                None | Some("probabilities") => OutputActivation::Probabilities,
                Some("logits") => OutputActivation::Logits,
                Some(other) => anyhow::bail!(
                    "CHATGUARD_MODEL_OUTPUT must be `probabilities` or `logits`, got `{other}`"
                ),
            },
            input: match get("CHATGUARD_MODEL_INPUT").as_deref() {
                None | Some("int64") => InputEncoding::Int64,
                Some("float32") => InputEncoding::Float32,
                Some(other) => anyhow::bail!(
                    "CHATGUARD_MODEL_INPUT must be `int64` or `float32`, got `{other}`"
                ),
            },
        };

        let threshold: f64 = parse_or(&get, "CHATGUARD_THRESHOLD", DEFAULT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("CHATGUARD_THRESHOLD must be between 0 and 1, got {threshold}");
        }

        Ok(Self {
            discord_token: get("DISCORD_TOKEN").unwrap_or_default(),
            greeting_channel_id: get("CHATGUARD_GREETING_CHANNEL_ID"),
            greeting_message: get("CHATGUARD_GREETING")
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            model_path: get("CHATGUARD_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_model_path),
            corpus_path: get("CHATGUARD_CORPUS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CORPUS_PATH)),
            corpus_column: get("CHATGUARD_CORPUS_COLUMN")
                .unwrap_or_else(|| DEFAULT_TEXT_COLUMN.to_string()),
            vocabulary_path: get("CHATGUARD_VOCAB_PATH").map(PathBuf::from),
            max_features: parse_or(&get, "CHATGUARD_MAX_FEATURES", DEFAULT_MAX_FEATURES)?,
            sequence_length: parse_or(&get, "CHATGUARD_SEQUENCE_LENGTH", DEFAULT_SEQUENCE_LENGTH)?,
            threshold,
            model_options,
            api_url: get("DISCORD_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            gateway_url: get("DISCORD_GATEWAY_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
        })
    }

    /// Check that the Discord token is configured.
    /// Call this before connecting; the token itself is validated by Discord.
    pub fn require_token(&self) -> Result<()> {
        if self.discord_token.is_empty() {
            anyhow::bail!(
                "DISCORD_TOKEN not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }
}

/// Default model location: ~/.local/share/chatguard/models/toxicity.onnx on Linux.
pub fn default_model_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatguard")
        .join("models")
        .join("toxicity.onnx")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: `{raw}`")),
        None => Ok(default),
    }
}
