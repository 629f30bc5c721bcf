//! Hyperparameter spaces, the per-trial training loop and the search driver.

pub mod space;
pub mod trainer;
pub mod tuner;

pub use space::{
    EncoderKind, HyperParams, ParamKind, ParamRequirement, ParamSpec, ParamValue, SearchSpace,
};
pub use trainer::{EpochMetrics, FitReport, Trainer};
pub use tuner::{
    search, split_indices, HyperparameterTuner, SearchOutcome, TrialRecord, TrialStatus,
};
