//! Variable types and label encoding.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::annotation::AnnotationValue;
use crate::error::OmicsError;
use crate::neural::loss::MISSING_CLASS;

/// Kind of supervised task attached to a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Numerical,
    Categorical,
    SurvivalEvent,
}

impl VariableType {
    /// True when the head emits a single scalar.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, VariableType::Categorical)
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableType::Numerical => "numerical",
            VariableType::Categorical => "categorical",
            VariableType::SurvivalEvent => "survival_event",
        };
        f.write_str(name)
    }
}

impl FromStr for VariableType {
    type Err = OmicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numerical" => Ok(VariableType::Numerical),
            "categorical" => Ok(VariableType::Categorical),
            "survival_event" | "survival" => Ok(VariableType::SurvivalEvent),
            other => Err(OmicsError::configuration(
                "variable type",
                format!("unknown variable type '{other}'"),
            )),
        }
    }
}

/// Infer the type of an annotation column.
///
/// Categorical when any present value is text, or when every present value
/// is an integer and there are at most `categorical_max_levels` distinct
/// values. Numerical otherwise (including an all-missing column).
pub fn infer_variable_type(values: &[AnnotationValue], categorical_max_levels: usize) -> VariableType {
    let mut distinct = BTreeSet::new();
    let mut all_integer = true;
    let mut any_present = false;

    for value in values {
        match value {
            AnnotationValue::Text(_) => return VariableType::Categorical,
            AnnotationValue::Number(v) if !v.is_nan() => {
                any_present = true;
                all_integer &= v.fract() == 0.0;
                if all_integer {
                    distinct.insert(*v as i64);
                }
            }
            _ => {}
        }
    }

    if any_present && all_integer && distinct.len() <= categorical_max_levels {
        VariableType::Categorical
    } else {
        VariableType::Numerical
    }
}

/// Class index ↔ label mapping for a categorical variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    labels: Vec<String>,
}

impl LabelEncoding {
    /// Distinct labels in sorted order (numeric labels by value, then text).
    pub fn fit(values: &[AnnotationValue]) -> Self {
        let mut labels: Vec<String> = values
            .iter()
            .filter_map(AnnotationValue::as_label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        labels.sort_by(compare_labels);
        Self { labels }
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Class index as `f32`, or [`MISSING_CLASS`] for missing/unseen labels.
    pub fn encode(&self, value: &AnnotationValue) -> f32 {
        value
            .as_label()
            .and_then(|label| self.labels.iter().position(|l| *l == label))
            .map(|idx| idx as f32)
            .unwrap_or(MISSING_CLASS)
    }

    pub fn decode(&self, class: usize) -> Option<&str> {
        self.labels.get(class).map(String::as_str)
    }
}

fn compare_labels(a: &String, b: &String) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<AnnotationValue> {
        values.iter().map(|&v| AnnotationValue::from(v)).collect()
    }

    #[test]
    fn test_text_is_categorical() {
        let values = vec![AnnotationValue::from("a"), AnnotationValue::Number(1.5)];
        assert_eq!(infer_variable_type(&values, 2), VariableType::Categorical);
    }

    #[test]
    fn test_binary_integers_are_categorical() {
        assert_eq!(
            infer_variable_type(&nums(&[0.0, 1.0, f64::NAN, 1.0]), 2),
            VariableType::Categorical
        );
        assert_eq!(
            infer_variable_type(&nums(&[0.0, 1.0, 2.0]), 2),
            VariableType::Numerical
        );
        assert_eq!(
            infer_variable_type(&nums(&[0.5, 1.0]), 2),
            VariableType::Numerical
        );
    }

    #[test]
    fn test_label_encoding_orders_numeric_labels_by_value() {
        let encoding = LabelEncoding::fit(&nums(&[10.0, 2.0, 1.0, 2.0]));
        assert_eq!(encoding.labels(), &["1", "2", "10"]);
        assert_eq!(encoding.encode(&AnnotationValue::Number(10.0)), 2.0);
    }

    #[test]
    fn test_unseen_label_is_missing() {
        let encoding = LabelEncoding::fit(&[AnnotationValue::from("x")]);
        assert_eq!(encoding.encode(&AnnotationValue::from("y")), MISSING_CLASS);
        assert_eq!(encoding.encode(&AnnotationValue::Missing), MISSING_CLASS);
    }

    #[test]
    fn test_unknown_variable_type() {
        assert!("ordinal".parse::<VariableType>().is_err());
    }
}
