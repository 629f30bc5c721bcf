//! Sample annotation table (clinical variables).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Raw value of one annotation cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Number(f64),
    Text(String),
    Missing,
}

impl AnnotationValue {
    /// Parse a raw cell as read from a table: empty, `NA` and `NaN` are
    /// missing, numbers are numbers, anything else is text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AnnotationValue::Missing;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "na" | "nan" | "null" | "none" => return AnnotationValue::Missing,
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => AnnotationValue::Number(value),
            _ => AnnotationValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            AnnotationValue::Missing => true,
            AnnotationValue::Number(v) => v.is_nan(),
            AnnotationValue::Text(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnnotationValue::Number(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Label used when the value is treated as a categorical class.
    pub fn as_label(&self) -> Option<String> {
        match self {
            AnnotationValue::Missing => None,
            AnnotationValue::Number(v) if v.is_nan() => None,
            AnnotationValue::Number(v) if v.fract() == 0.0 => Some(format!("{}", *v as i64)),
            AnnotationValue::Number(v) => Some(v.to_string()),
            AnnotationValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for AnnotationValue {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            AnnotationValue::Missing
        } else {
            AnnotationValue::Number(value)
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(value: &str) -> Self {
        AnnotationValue::parse(value)
    }
}

static MISSING: AnnotationValue = AnnotationValue::Missing;

/// Sample id → variable name → value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotation {
    rows: BTreeMap<String, HashMap<String, AnnotationValue>>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        sample: impl Into<String>,
        variable: impl Into<String>,
        value: impl Into<AnnotationValue>,
    ) {
        self.rows
            .entry(sample.into())
            .or_default()
            .insert(variable.into(), value.into());
    }

    /// Merge another table; rows of `other` win on conflicts.
    pub fn extend(&mut self, other: Annotation) {
        for (sample, values) in other.rows {
            self.rows.entry(sample).or_default().extend(values);
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn contains_sample(&self, sample: &str) -> bool {
        self.rows.contains_key(sample)
    }

    pub fn has_variable(&self, variable: &str) -> bool {
        self.rows.values().any(|row| row.contains_key(variable))
    }

    /// Cell value; absent cells read as missing.
    pub fn get(&self, sample: &str, variable: &str) -> &AnnotationValue {
        self.rows
            .get(sample)
            .and_then(|row| row.get(variable))
            .unwrap_or(&MISSING)
    }

    /// Values of one variable in the given sample order.
    pub fn column(&self, variable: &str, samples: &[String]) -> Vec<AnnotationValue> {
        samples
            .iter()
            .map(|sample| self.get(sample, variable).clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
