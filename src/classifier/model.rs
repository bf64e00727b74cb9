//! Softmax logistic-regression head and its JSON artifact.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Intent;
use super::encoder::{HashingEncoder, SentenceEncoder};
use crate::error::ClassifierError;

/// Artifact format version. Bump when the encoder or layout changes.
pub const MODEL_VERSION: u32 = 1;

/// Gradient-descent settings for [`IntentModel::train`].
#[derive(Debug, Clone, Copy)]
pub struct TrainingParams {
    pub epochs: usize,
    pub learning_rate: f32,
    /// L2 penalty on the weights (not the bias).
    pub l2: f32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 400,
            learning_rate: 2.0,
            l2: 1e-4,
        }
    }
}

/// A trained classifier head: one weight row and bias per label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentModel {
    pub version: u32,
    pub dims: usize,
    pub labels: Vec<Intent>,
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl IntentModel {
    /// Fit a softmax head with full-batch gradient descent.
    ///
    /// Weights start at zero and examples are visited in order, so the same
    /// inputs always produce the same model.
    pub fn train(
        examples: &[(Intent, &str)],
        encoder: &dyn SentenceEncoder,
        params: TrainingParams,
    ) -> Result<Self, ClassifierError> {
        if examples.is_empty() {
            return Err(ClassifierError::Training("no training examples".into()));
        }
        if params.epochs == 0 || params.learning_rate <= 0.0 {
            return Err(ClassifierError::Training(
                "epochs and learning_rate must be positive".into(),
            ));
        }

        let labels: Vec<Intent> = Intent::ALL.to_vec();
        let dims = encoder.dims();
        let k = labels.len();

        // Embeddings are mostly zeros; keep only the non-zero entries.
        let data: Vec<(usize, Vec<(usize, f32)>)> = examples
            .iter()
            .map(|(intent, text)| {
                let target = labels.iter().position(|l| l == intent).unwrap_or(k - 1);
                let sparse = encoder
                    .encode(text)
                    .into_iter()
                    .enumerate()
                    .filter(|(_, v)| *v != 0.0)
                    .collect();
                (target, sparse)
            })
            .collect();

        let n = data.len() as f32;
        let mut weights = vec![vec![0.0f32; dims]; k];
        let mut bias = vec![0.0f32; k];

        for epoch in 0..params.epochs {
            let mut grad_w = vec![vec![0.0f32; dims]; k];
            let mut grad_b = vec![0.0f32; k];
            let mut loss = 0.0f32;

            for (target, features) in &data {
                let logits: Vec<f32> = (0..k)
                    .map(|c| {
                        bias[c]
                            + features
                                .iter()
                                .map(|(i, v)| weights[c][*i] * v)
                                .sum::<f32>()
                    })
                    .collect();
                let probs = softmax(&logits);
                loss -= probs[*target].max(f32::MIN_POSITIVE).ln();

                for c in 0..k {
                    let err = probs[c] - if c == *target { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for (i, v) in features {
                        grad_w[c][*i] += err * v;
                    }
                }
            }

            for c in 0..k {
                for (w, g) in weights[c].iter_mut().zip(&grad_w[c]) {
                    *w -= params.learning_rate * (g / n + params.l2 * *w);
                }
                bias[c] -= params.learning_rate * grad_b[c] / n;
            }

            if epoch == 0 || (epoch + 1) % 100 == 0 {
                tracing::debug!(epoch = epoch + 1, loss = loss / n, "Training step");
            }
        }

        info!(
            examples = data.len(),
            labels = k,
            dims,
            epochs = params.epochs,
            "Intent model trained"
        );

        Ok(Self {
            version: MODEL_VERSION,
            dims,
            labels,
            weights,
            bias,
        })
    }

    /// Write the model as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Intent model saved");
        Ok(())
    }

    /// Read and validate a model written by [`IntentModel::save`].
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound {
                path: path.display().to_string(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&json)?;
        model.validate()?;
        info!(path = %path.display(), "Loaded pre-trained intent model");
        Ok(model)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.version != MODEL_VERSION {
            return Err(ClassifierError::InvalidModel(format!(
                "unsupported version {} (expected {MODEL_VERSION})",
                self.version
            )));
        }
        if self.labels.is_empty()
            || self.weights.len() != self.labels.len()
            || self.bias.len() != self.labels.len()
        {
            return Err(ClassifierError::InvalidModel(
                "labels, weights and bias lengths differ".into(),
            ));
        }
        if self.weights.iter().any(|row| row.len() != self.dims) {
            return Err(ClassifierError::InvalidModel(format!(
                "weight rows must have {} columns",
                self.dims
            )));
        }
        Ok(())
    }

    /// The encoder the artifact was trained with.
    pub fn encoder(&self) -> HashingEncoder {
        HashingEncoder::new(self.dims)
    }

    /// Class probabilities for `text`, in label order.
    pub fn predict_proba(&self, text: &str) -> Vec<(Intent, f32)> {
        self.predict_proba_embedding(&self.encoder().encode(text))
    }

    /// Class probabilities for an already-encoded sentence.
    pub fn predict_proba_embedding(&self, embedding: &[f32]) -> Vec<(Intent, f32)> {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(embedding).map(|(w, x)| w * x).sum::<f32>())
            .collect();
        self.labels
            .iter()
            .copied()
            .zip(softmax(&logits))
            .collect()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
