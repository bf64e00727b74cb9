//! Intent classification for inbound WhatsApp messages.
//!
//! A sentence encoder turns the message into an embedding and a softmax
//! head, trained on a small few-shot set, scores it against four intents.
//! Low-confidence predictions collapse to [`Intent::Other`].

pub mod encoder;
pub mod examples;
pub mod model;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use encoder::{HashingEncoder, SentenceEncoder};
pub use model::{IntentModel, TrainingParams};

use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

/// Messages shorter than this (after trimming) are noise.
pub const MIN_MESSAGE_CHARS: usize = 2;

/// Messages this long or longer are treated as off-topic.
pub const MAX_MESSAGE_CHARS: usize = 400;

/// What the customer is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// General booking inquiry.
    Greeting,
    Availability,
    Pricing,
    /// Hours, location, social noise, off-topic. Never answered.
    Other,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::Greeting,
        Intent::Availability,
        Intent::Pricing,
        Intent::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "GREETING",
            Intent::Availability => "AVAILABILITY",
            Intent::Pricing => "PRICING",
            Intent::Other => "OTHER",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ClassifierError::InvalidModel(format!("unknown intent label: {s}")))
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    /// Probability of the top-scoring label, even when `intent` fell back to
    /// `Other`.
    pub confidence: f32,
}

/// Classifier wrapping a trained [`IntentModel`] and its encoder.
pub struct IntentClassifier {
    encoder: Arc<dyn SentenceEncoder>,
    model: IntentModel,
    threshold: f32,
}

impl IntentClassifier {
    /// Use `model` with the hashing encoder it was trained with.
    pub fn new(model: IntentModel, threshold: f32) -> Self {
        let encoder = Arc::new(model.encoder());
        Self {
            encoder,
            model,
            threshold,
        }
    }

    /// Use a custom encoder. Its width must match the model's.
    pub fn with_encoder(
        model: IntentModel,
        encoder: Arc<dyn SentenceEncoder>,
        threshold: f32,
    ) -> Result<Self, ClassifierError> {
        if encoder.dims() != model.dims {
            return Err(ClassifierError::InvalidModel(format!(
                "encoder produces {} dims but model expects {}",
                encoder.dims(),
                model.dims
            )));
        }
        Ok(Self {
            encoder,
            model,
            threshold,
        })
    }

    /// Load the model artifact named in `config`.
    ///
    /// Fails with [`ClassifierError::ModelNotFound`] if it has not been
    /// trained yet.
    pub fn load(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let model = IntentModel::load(&config.model_path)?;
        Ok(Self::new(model, config.confidence_threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, message: &str) -> Classification {
        let clean = message.trim();
        let len = clean.chars().count();

        if len < MIN_MESSAGE_CHARS || len >= MAX_MESSAGE_CHARS {
            return Classification {
                intent: Intent::Other,
                confidence: 0.0,
            };
        }

        let probs = self
            .model
            .predict_proba_embedding(&self.encoder.encode(message));
        let (predicted, confidence) = probs
            .into_iter()
            .fold((Intent::Other, f32::MIN), |best, (intent, p)| {
                if p > best.1 { (intent, p) } else { best }
            });

        let intent = if predicted == Intent::Other || confidence < self.threshold {
            Intent::Other
        } else {
            predicted
        };

        tracing::debug!(%intent, %predicted, confidence, "Message classified");
        Classification { intent, confidence }
    }
}
