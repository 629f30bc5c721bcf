//! Evaluation metrics
//!
//! Implements the per-task metrics reported for held-out predictions:
//! - Regression: MSE, RMSE, R², Pearson correlation
//! - Classification: accuracy, balanced accuracy, macro F1, Cohen's kappa
//! - Survival: Harrell's concordance index
//!
//! Callers are expected to have removed samples with missing labels.

mod classification;
mod regression;
mod survival;

pub use classification::{evaluate_classifier, ClassificationMetrics};
pub use regression::{evaluate_regressor, RegressionMetrics};
pub use survival::{concordance_index, evaluate_survival};

/// Flatten a metrics struct into `(name, value)` pairs.
pub trait MetricSet {
    fn named_values(&self) -> Vec<(&'static str, f64)>;
}
