//! Error types for dataset construction, training and search.
//!
//! Alignment and configuration problems surface at dataset construction time;
//! training instability is caught per trial by the tuner and only becomes
//! fatal as [`OmicsError::SearchExhausted`].

use thiserror::Error;

/// Result type alias for multi-omic operations
pub type OmicsResult<T> = Result<T, OmicsError>;

/// Error type for the multi-omic pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OmicsError {
    /// Invalid fusion mode, empty layer, unknown variable, bad hyperparameter
    #[error("Configuration error in {context}: {reason}")]
    Configuration { context: String, reason: String },

    /// No common samples across layers and annotation
    #[error("Alignment error: {details}")]
    Alignment { details: String },

    /// Non-finite loss while training one configuration
    #[error("Training unstable at epoch {epoch}: {details}")]
    TrainingInstability { epoch: usize, details: String },

    /// Every sampled configuration failed to train
    #[error("Hyperparameter search exhausted: {failed} of {attempted} trials failed ({reason})")]
    SearchExhausted {
        attempted: usize,
        failed: usize,
        reason: String,
    },

    /// Matrix shapes disagree
    #[error("Dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    /// Operation not allowed in the model's current lifecycle state
    #[error("Operation '{operation}' not allowed while model is {state}")]
    InvalidState { operation: String, state: String },
}

// Convenience constructors for common error patterns
impl OmicsError {
    pub fn configuration(context: impl Into<String>, reason: impl Into<String>) -> Self {
        OmicsError::Configuration {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn alignment(details: impl Into<String>) -> Self {
        OmicsError::Alignment {
            details: details.into(),
        }
    }

    pub fn instability(epoch: usize, details: impl Into<String>) -> Self {
        OmicsError::TrainingInstability {
            epoch,
            details: details.into(),
        }
    }

    pub fn dimension_mismatch(expected: usize, got: usize, context: impl Into<String>) -> Self {
        OmicsError::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        OmicsError::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// True for errors the tuner records and skips rather than propagating.
    pub fn is_trial_local(&self) -> bool {
        matches!(
            self,
            OmicsError::TrainingInstability { .. } | OmicsError::Configuration { .. }
        )
    }
}
