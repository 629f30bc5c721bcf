//! Multi-omic Shared Library
//!
//! Types shared between the multi-omic core and the collaborators that read
//! its results.
//!
//! This library provides:
//! - Flat result tables (metric rows, feature importance rows)
//! - Evaluation metrics for regression, classification and survival tasks

pub mod metrics;
pub mod tables;

// Re-export commonly used types
pub use metrics::{
    concordance_index, evaluate_classifier, evaluate_regressor, evaluate_survival,
    ClassificationMetrics, MetricSet, RegressionMetrics,
};
pub use tables::{ImportanceRow, MetricRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
