//! Flat result tables handed to the results writer.
//!
//! Both row types are plain records so a writer can stream them to CSV or
//! JSON without knowing anything about the model that produced them.

use serde::{Deserialize, Serialize};

/// One evaluation metric for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub variable: String,
    pub variable_type: String,
    pub metric: String,
    pub value: f64,
}

impl MetricRow {
    pub fn new(
        variable: impl Into<String>,
        variable_type: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            variable: variable.into(),
            variable_type: variable_type.into(),
            metric: metric.into(),
            value,
        }
    }
}

/// Attribution of one input feature towards one variable's output.
///
/// `target_class` is set for categorical variables, where every class logit
/// gets its own attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRow {
    pub variable: String,
    pub target_class: Option<usize>,
    pub target_class_label: Option<String>,
    pub layer: String,
    pub feature: String,
    pub importance: f64,
}
