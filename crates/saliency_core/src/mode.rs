//! Execution mode passed explicitly to every forward pass.

use serde::{Deserialize, Serialize};

/// Whether a model runs with training-only behaviour enabled.
///
/// Explanation routines always run in [`ExecutionMode::Inference`] so that
/// dropout and batch-statistics updates are disabled and the scores are a
/// deterministic function of the input.
///
/// # Example
///
/// ```rust
/// use saliency_core::ExecutionMode;
///
/// let mode = ExecutionMode::default();
/// assert!(mode.is_inference());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// Stochastic layers and statistics updates disabled.
    #[default]
    Inference,
    /// Training behaviour (dropout, running statistics) enabled.
    Training,
}

impl ExecutionMode {
    /// Check if this is inference mode.
    #[must_use]
    pub const fn is_inference(&self) -> bool {
        matches!(self, ExecutionMode::Inference)
    }

    /// Check if this is training mode.
    #[must_use]
    pub const fn is_training(&self) -> bool {
        matches!(self, ExecutionMode::Training)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Inference => write!(f, "inference"),
            ExecutionMode::Training => write!(f, "training"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_checks() {
        assert!(ExecutionMode::Inference.is_inference());
        assert!(!ExecutionMode::Inference.is_training());
        assert!(ExecutionMode::Training.is_training());
        assert!(!ExecutionMode::Training.is_inference());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(format!("{}", ExecutionMode::Inference), "inference");
        assert_eq!(format!("{}", ExecutionMode::Training), "training");
    }

    #[test]
    fn test_mode_serde() {
        let json = serde_json::to_string(&ExecutionMode::Training).unwrap();
        let decoded: ExecutionMode = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ExecutionMode::Training);
    }
}
