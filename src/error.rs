use thiserror::Error;

/// Errors produced by the detection post-processing core.
///
/// Malformed or truncated dump headers are not represented here: the
/// decoder treats them as an absent lookup so the next fallback location
/// can still answer.
#[derive(Debug, Error)]
pub enum DetectError {
    /// An input image or tensor had unusable geometry.
    #[error("shape error: {0}")]
    ShapeError(String),

    /// Every fallback location for a required layer dump was exhausted.
    /// Verification cannot proceed without the reference tensor.
    #[error("no dump artifacts found for layer `{layer}`")]
    DumpMissing { layer: String },

    /// Region-proposal mode requires exactly one pyramid scale.
    #[error("RPN mode ran with {0} pyramid scales, expected exactly 1")]
    MultiScaleRpn(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tensor(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
