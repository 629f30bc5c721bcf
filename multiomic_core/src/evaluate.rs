//! Held-out evaluation of every supervised head.

use multiomic_shared::{evaluate_classifier, evaluate_regressor, evaluate_survival, MetricRow, MetricSet};

use crate::data::dataset::MultiOmicDataset;
use crate::data::variable::VariableType;
use crate::error::{OmicsError, OmicsResult};
use crate::model::{Encoder, ModelCore};

/// Metric rows for each model variable; samples with a missing label are
/// left out per variable, and variables without any labelled sample are
/// skipped.
pub fn evaluate<E: Encoder>(model: &ModelCore<E>, dataset: &MultiOmicDataset) -> OmicsResult<Vec<MetricRow>> {
    let predictions = model.predict(dataset)?;
    let mut rows = Vec::new();

    for variable in model.variables() {
        let (Some(kind), Some(labels), Some(prediction)) = (
            model.variable_type(variable),
            dataset.labels(variable),
            predictions.get(variable),
        ) else {
            return Err(OmicsError::configuration(
                "evaluation",
                format!("dataset has no labels for '{variable}'"),
            ));
        };
        let predicted = prediction.values.column(0);

        let metrics: Vec<(&'static str, f64)> = match kind {
            VariableType::Numerical => {
                let (truth, pred): (Vec<f64>, Vec<f64>) = labels
                    .iter()
                    .zip(predicted.iter())
                    .filter(|(y, _)| !y.is_nan())
                    .map(|(&y, &p)| (f64::from(y), f64::from(p)))
                    .unzip();
                if truth.is_empty() {
                    Vec::new()
                } else {
                    evaluate_regressor(&truth, &pred).named_values()
                }
            }
            VariableType::Categorical => {
                let (truth, pred): (Vec<usize>, Vec<usize>) = labels
                    .iter()
                    .zip(predicted.iter())
                    .filter(|(y, _)| **y >= 0.0)
                    .map(|(&y, &p)| (y as usize, p as usize))
                    .unzip();
                if truth.is_empty() {
                    Vec::new()
                } else {
                    evaluate_classifier(&truth, &pred).named_values()
                }
            }
            VariableType::SurvivalEvent => {
                let times = dataset
                    .survival()
                    .and_then(|pair| dataset.labels(&pair.time))
                    .ok_or_else(|| {
                        OmicsError::configuration("evaluation", format!("no survival time for '{variable}'"))
                    })?;
                let mut durations = Vec::new();
                let mut events = Vec::new();
                let mut risks = Vec::new();
                for ((&t, &e), &r) in times.iter().zip(labels.iter()).zip(predicted.iter()) {
                    if t.is_nan() || e.is_nan() {
                        continue;
                    }
                    durations.push(f64::from(t));
                    events.push(e > 0.5);
                    risks.push(f64::from(r));
                }
                if durations.is_empty() {
                    Vec::new()
                } else {
                    evaluate_survival(&durations, &events, &risks)
                }
            }
        };

        if metrics.is_empty() {
            tracing::debug!(variable = %variable, "no labelled samples, skipping evaluation");
        }
        rows.extend(
            metrics
                .into_iter()
                .map(|(metric, value)| MetricRow::new(variable.as_str(), kind.to_string(), metric, value)),
        );
    }

    Ok(rows)
}
