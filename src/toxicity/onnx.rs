// Local ONNX toxicity classifier.
//
// Runs the multi-label toxic comment model entirely on the local CPU. The
// model is an ONNX export of the trained network: one input of shape
// [1, sequence_length] holding vocabulary ids, one output with a score per
// label (toxic, obscene, threat, insult, identity hate).

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::labels::{ClassificationResult, LABEL_COUNT};
use super::traits::ToxicityClassifier;
use super::vectorizer::TextVectorizer;

/// What the model's output layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputActivation {
    /// Sigmoid is part of the exported graph; outputs are already 0-1.
    #[default]
    Probabilities,
    /// Raw logits; we apply sigmoid ourselves.
    Logits,
}

/// Element type of the model's input tensor. Exports of the same network
/// differ depending on whether the input layer was declared as integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputEncoding {
    #[default]
    Int64,
    Float32,
}

/// Shape-independent model settings, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelOptions {
    pub activation: OutputActivation,
    pub input: InputEncoding,
}

/// Local ONNX-based toxicity classifier. Holds the model session and
/// vectorizer behind Arc so inference can be offloaded to spawn_blocking.
pub struct OnnxToxicityClassifier {
    // ort::Session::run takes &mut self, hence the Mutex. Messages are
    // handled one at a time, so the lock is uncontended in practice.
    session: Arc<Mutex<Session>>,
    vectorizer: Arc<TextVectorizer>,
    options: ModelOptions,
}

impl OnnxToxicityClassifier {
    /// Load the ONNX model at `model_path` and verify it emits one score per
    /// label.
    ///
    /// The check runs a single probe inference on an all-padding sequence, so
    /// a model with the wrong input shape or output width fails here rather
    /// than on the first real message.
    pub fn load(model_path: &Path, vectorizer: TextVectorizer, options: ModelOptions) -> Result<Self> {
        if !model_path.exists() {
            anyhow::bail!(
                "Model file not found: {}\nSet CHATGUARD_MODEL_PATH to the exported ONNX model.",
                model_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
        let session = Mutex::new(session);

        let probe = vec![super::vectorizer::PAD_ID; vectorizer.sequence_length()];
        let raw = run_model(&session, probe, options.input)
            .with_context(|| format!("Probe inference failed for {}", model_path.display()))?;
        if raw.len() != LABEL_COUNT {
            anyhow::bail!(
                "Model {} produces {} scores per input; expected {} \
                 (toxic, obscene, threat, insult, identity hate)",
                model_path.display(),
                raw.len(),
                LABEL_COUNT
            );
        }

        info!(
            model = %model_path.display(),
            sequence_length = vectorizer.sequence_length(),
            "Loaded ONNX toxicity model"
        );

        Ok(Self {
            session: Arc::new(session),
            vectorizer: Arc::new(vectorizer),
            options,
        })
    }
}

#[async_trait]
impl ToxicityClassifier for OnnxToxicityClassifier {
    /// Vectorize, run one forward pass, and map the outputs to labels.
    ///
    /// The CPU-bound work is offloaded to spawn_blocking so the gateway
    /// heartbeat keeps running while a message is scored.
    async fn predict(&self, text: &str) -> Result<ClassificationResult> {
        let session = Arc::clone(&self.session);
        let vectorizer = Arc::clone(&self.vectorizer);
        let options = self.options;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let ids = vectorizer.vectorize(&text);
            let raw = run_model(&session, ids, options.input)?;
            let result = scores_to_result(&raw, options.activation)?;

            debug!(
                scores = ?result.iter().collect::<Vec<_>>(),
                text_preview = %crate::output::truncate_chars(&text, 50),
                "ONNX scored text"
            );

            Ok::<_, anyhow::Error>(result)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Run one sequence through the model and return the flat output scores.
fn run_model(session: &Mutex<Session>, ids: Vec<i64>, input: InputEncoding) -> Result<Vec<f32>> {
    let shape = [1_i64, ids.len() as i64];

    let mut session = session
        .lock()
        .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

    let outputs = match input {
        InputEncoding::Int64 => {
            let tensor = Tensor::from_array((shape, ids)).context("Failed to create input tensor")?;
            session
                .run(ort::inputs![tensor])
                .context("ONNX inference failed")?
        }
        InputEncoding::Float32 => {
            let values: Vec<f32> = ids.iter().map(|&id| id as f32).collect();
            let tensor =
                Tensor::from_array((shape, values)).context("Failed to create input tensor")?;
            session
                .run(ort::inputs![tensor])
                .context("ONNX inference failed")?
        }
    };

    // Output shape: [1, 5]
    let (_out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .context("Failed to extract output tensor")?;

    Ok(data.to_vec())
}

/// Sigmoid activation: maps any real number to (0, 1).
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Map raw model outputs to a ClassificationResult, applying sigmoid first
/// when the model emits logits.
fn scores_to_result(raw: &[f32], activation: OutputActivation) -> Result<ClassificationResult> {
    let scores: Vec<f64> = match activation {
        OutputActivation::Probabilities => raw.iter().map(|&s| s as f64).collect(),
        OutputActivation::Logits => raw.iter().map(|&logit| sigmoid(logit as f64)).collect(),
    };
    ClassificationResult::from_scores(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toxicity::labels::Label;

    #[test]
    fn test_sigmoid_zero() {
        let result = sigmoid(0.0);
        assert!((result - 0.5).abs() < 1e-10, "sigmoid(0) should be 0.5");
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [0.5, 1.0, 2.0, 5.0] {
            let sum = sigmoid(x) + sigmoid(-x);
            assert!(
                (sum - 1.0).abs() < 1e-10,
                "sigmoid({x}) + sigmoid(-{x}) should equal 1.0"
            );
        }
    }

    #[test]
    fn test_scores_to_result_probabilities_pass_through() {
        let raw = [0.63_f32, 0.1, 0.81, 0.2, 0.05];
        let result = scores_to_result(&raw, OutputActivation::Probabilities).unwrap();
        assert!((result.score(Label::Toxic) - 0.63).abs() < 1e-6);
        assert!((result.score(Label::Threat) - 0.81).abs() < 1e-6);
        assert!((result.score(Label::IdentityHate) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_scores_to_result_logits_apply_sigmoid() {
        let raw = [0.0_f32, 10.0, -10.0, 0.0, 0.0];
        let result = scores_to_result(&raw, OutputActivation::Logits).unwrap();
        assert!((result.score(Label::Toxic) - 0.5).abs() < 1e-10);
        assert!(result.score(Label::Obscene) > 0.999);
        assert!(result.score(Label::Threat) < 0.001);
    }

    #[test]
    fn test_scores_to_result_rejects_wrong_width() {
        let raw = [0.1_f32; 7];
        assert!(scores_to_result(&raw, OutputActivation::Probabilities).is_err());
    }

    #[test]
    fn test_load_missing_model_fails() {
        let vectorizer = TextVectorizer::fit(["hello world"], 100, 8).unwrap();
        let path = std::env::temp_dir().join("chatguard-no-such-model.onnx");
        let err = match OnnxToxicityClassifier::load(&path, vectorizer, ModelOptions::default()) {
            Ok(_) => panic!("loading a missing model should fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Model file not found"));
    }
}
