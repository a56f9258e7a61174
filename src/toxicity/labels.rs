// Toxicity labels and per-message classification results.
//
// The label order is fixed by the model: output neuron i scores Label::ALL[i].
// Everything downstream (classify, notifications, terminal output) relies on
// iterating in this order.

use std::fmt;

use anyhow::Result;

/// Number of scores the model emits per input.
pub const LABEL_COUNT: usize = 5;

/// Default confidence a label's score must exceed to be triggered.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// One toxicity category the model scores independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Toxic,
    Obscene,
    Threat,
    Insult,
    IdentityHate,
}

impl Label {
    /// All labels, in model output order.
    pub const ALL: [Label; LABEL_COUNT] = [
        Label::Toxic,
        Label::Obscene,
        Label::Threat,
        Label::Insult,
        Label::IdentityHate,
    ];

    /// Position of this label in the model output.
    pub fn index(&self) -> usize {
        match self {
            Label::Toxic => 0,
            Label::Obscene => 1,
            Label::Threat => 2,
            Label::Insult => 3,
            Label::IdentityHate => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Toxic => "toxic",
            Label::Obscene => "obscene",
            Label::Threat => "threat",
            Label::Insult => "insult",
            Label::IdentityHate => "identity hate",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-label probabilities for a single message.
///
/// Scores are independent (multi-label): several labels can be high at once
/// and they need not sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    scores: [f64; LABEL_COUNT],
}

impl ClassificationResult {
    /// Build a result from raw model scores in label order.
    ///
    /// Requires exactly `LABEL_COUNT` finite values. Values are clamped into
    /// [0, 1] to absorb float noise at the edges of the sigmoid.
    pub fn from_scores(raw: &[f64]) -> Result<Self> {
        if raw.len() != LABEL_COUNT {
            anyhow::bail!(
                "Expected {} label scores, model produced {}",
                LABEL_COUNT,
                raw.len()
            );
        }

        let mut scores = [0.0; LABEL_COUNT];
        for (slot, &value) in scores.iter_mut().zip(raw) {
            if !value.is_finite() {
                anyhow::bail!("Model produced a non-finite score: {value}");
            }
            *slot = value.clamp(0.0, 1.0);
        }

        Ok(Self { scores })
    }

    /// Probability for a single label.
    pub fn score(&self, label: Label) -> f64 {
        self.scores[label.index()]
    }

    /// (label, probability) pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, f64)> + '_ {
        Label::ALL.iter().map(move |&label| (label, self.score(label)))
    }

    /// Labels whose score strictly exceeds `threshold`, in label order.
    /// Empty means the message is clean.
    pub fn triggered(&self, threshold: f64) -> Vec<Label> {
        self.iter()
            .filter(|&(_, score)| score > threshold)
            .map(|(label, _)| label)
            .collect()
    }
}

/// Join labels the way they appear in author notifications: "toxic, threat".
pub fn join_labels(labels: &[Label]) -> String {
    labels
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
