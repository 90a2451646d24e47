//! ---
//! irri_section: "04-decision-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Pure irrigation decision logic."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---

/// Errors raised by a predictive model.
///
/// Never user-visible: the decision engine falls back to the heuristic rule
/// chain whenever the predictor errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Model backend is not loaded or unreachable.
    #[error("model unavailable: {0}")]
    Unavailable(String),
    /// Model rejected the feature vector.
    #[error("prediction failed: {0}")]
    Failed(String),
}

/// Output of one model invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class: 1 means irrigate, 0 means do not.
    pub label: u8,
    /// Maximum class probability, `0.0..=1.0`.
    pub confidence: f64,
}

/// Black-box decision model collaborator.
///
/// Given a fixed-order feature vector, returns a class label and confidence.
/// Loading and lifecycle live outside the core; the engine only ever calls
/// [`Predictor::predict`].
pub trait Predictor: Send + Sync {
    /// Classify the feature vector.
    fn predict(&self, features: &[f64]) -> Result<Prediction, ModelError>;
}
