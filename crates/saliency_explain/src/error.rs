//! Error types for saliency_explain.

use saliency_core::CoreError;
use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while computing explanations.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// An argument was outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The perturbation explainer rejected its input.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Backpropagation produced no gradient for the input tensor.
    #[error("No gradient reached the input tensor; does the model output depend on its input?")]
    MissingGradient,

    /// The model returned scores of an unexpected shape.
    #[error("Unexpected model output: expected {expected}, got {got}")]
    ModelOutput {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// Error from saliency_core.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExplainError {
    /// Shorthand for [`ExplainError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for [`ExplainError::UpstreamFailure`].
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamFailure(msg.into())
    }
}
