// Toxicity classifier trait: the seam between the moderation agent and
// the model.
//
// The default implementation runs a local ONNX export of the multi-label
// model. The agent only sees this trait, so tests drive it with fixed scores.

use anyhow::Result;
use async_trait::async_trait;

use super::labels::{ClassificationResult, Label};

/// Trait for multi-label toxicity classification. Async because inference is
/// offloaded to a blocking thread so the event loop stays responsive.
#[async_trait]
pub trait ToxicityClassifier: Send + Sync {
    /// Score a single text, one probability per label in label order.
    async fn predict(&self, text: &str) -> Result<ClassificationResult>;

    /// Labels whose probability strictly exceeds `threshold`, in label order.
    /// Returns an empty list for clean text.
    async fn classify(&self, text: &str, threshold: f64) -> Result<Vec<Label>> {
        let result = self.predict(text).await?;
        Ok(result.triggered(threshold))
    }
}
