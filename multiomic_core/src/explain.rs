//! Integrated-gradient feature attribution.
//!
//! For every sample the input moves from a baseline `b` to its observed
//! value `x` in `steps` increments. The gradient of the variable's output is
//! taken at each increment (right Riemann sum, `α = k / steps`) and the
//! attribution of a feature is `(x − b) · mean_k ∂y/∂x`, summed over samples
//! with its sign kept. Categorical variables get one attribution per class
//! logit.

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use multiomic_shared::ImportanceRow;

use crate::data::dataset::MultiOmicDataset;
use crate::data::variable::VariableType;
use crate::error::{OmicsError, OmicsResult};
use crate::model::{Encoder, ModelCore};

/// Starting point of the attribution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    #[default]
    Zero,
    /// Per-feature mean over the dataset being explained
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceOptions {
    pub steps: usize,
    /// Samples per gradient batch
    pub batch_size: usize,
    pub baseline: Baseline,
}

impl Default for ImportanceOptions {
    fn default() -> Self {
        Self {
            steps: 5,
            batch_size: 64,
            baseline: Baseline::Zero,
        }
    }
}

/// Zero-baseline importance of every input feature for `variable`.
pub fn importance<E: Encoder>(
    model: &ModelCore<E>,
    dataset: &MultiOmicDataset,
    variable: &str,
    steps: usize,
) -> OmicsResult<Vec<ImportanceRow>> {
    importance_with(
        model,
        dataset,
        variable,
        &ImportanceOptions {
            steps,
            ..Default::default()
        },
    )
}

pub fn importance_with<E: Encoder>(
    model: &ModelCore<E>,
    dataset: &MultiOmicDataset,
    variable: &str,
    options: &ImportanceOptions,
) -> OmicsResult<Vec<ImportanceRow>> {
    if options.steps == 0 {
        return Err(OmicsError::configuration("importance", "steps must be at least 1"));
    }
    let kind = model.variable_type(variable).ok_or_else(|| {
        OmicsError::configuration("importance", format!("model has no head for '{variable}'"))
    })?;
    let expected = model.encoder().input_dims();
    let actual = dataset.input_dims();
    if expected != actual {
        return Err(OmicsError::dimension_mismatch(
            expected.iter().sum(),
            actual.iter().sum(),
            "features of explained dataset",
        ));
    }

    let class_labels: Vec<String> = match kind {
        VariableType::Categorical => model.label_mappings().get(variable).cloned().unwrap_or_default(),
        _ => Vec::new(),
    };
    let targets: Vec<Option<usize>> = if class_labels.is_empty() {
        vec![None]
    } else {
        (0..class_labels.len()).map(Some).collect()
    };

    let baselines: Vec<Array1<f32>> = match options.baseline {
        Baseline::Zero => actual.iter().map(|&d| Array1::zeros(d)).collect(),
        Baseline::Mean => dataset.column_means(),
    };

    // Graph encoders propagate across samples, so a chunk's induced subgraph
    // would drop edges; they are attributed on the whole graph at once.
    let chunk_size = if E::REQUIRES_GRAPH {
        dataset.len().max(1)
    } else {
        options.batch_size.max(1)
    };
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let partials = indices
        .par_chunks(chunk_size)
        .map(|chunk| {
            targets
                .iter()
                .map(|&target| batch_attribution(model, dataset, chunk, variable, target, &baselines, options.steps))
                .collect::<OmicsResult<Vec<_>>>()
        })
        .collect::<OmicsResult<Vec<_>>>()?;

    // Sum per-batch attributions in batch order
    let mut totals: Vec<Vec<Array1<f32>>> = targets
        .iter()
        .map(|_| actual.iter().map(|&d| Array1::zeros(d)).collect())
        .collect();
    for partial in &partials {
        for (total, part) in totals.iter_mut().zip(partial) {
            for (layer_total, layer_part) in total.iter_mut().zip(part) {
                *layer_total += layer_part;
            }
        }
    }

    let mut rows = Vec::new();
    for (target, per_layer) in targets.iter().zip(&totals) {
        for (layer, scores) in dataset.layers().iter().zip(per_layer) {
            for (feature, &score) in layer.features.iter().zip(scores.iter()) {
                rows.push(ImportanceRow {
                    variable: variable.to_string(),
                    target_class: *target,
                    target_class_label: target.and_then(|c| class_labels.get(c).cloned()),
                    layer: feature.layer.clone(),
                    feature: feature.name.clone(),
                    importance: f64::from(score),
                });
            }
        }
    }

    tracing::debug!(variable, rows = rows.len(), steps = options.steps, "feature importance");
    Ok(rows)
}

/// Attribution of one batch, summed over its samples, per input layer.
fn batch_attribution<E: Encoder>(
    model: &ModelCore<E>,
    dataset: &MultiOmicDataset,
    chunk: &[usize],
    variable: &str,
    target: Option<usize>,
    baselines: &[Array1<f32>],
    steps: usize,
) -> OmicsResult<Vec<Array1<f32>>> {
    let batch = dataset.batch(chunk);
    let deltas: Vec<Array2<f32>> = batch
        .inputs
        .iter()
        .zip(baselines)
        .map(|(x, b)| x - b)
        .collect();

    let mut grad_sums: Vec<Array2<f32>> = batch.inputs.iter().map(|x| Array2::zeros(x.dim())).collect();
    for k in 1..=steps {
        let alpha = k as f32 / steps as f32;
        let inputs = deltas
            .iter()
            .zip(baselines)
            .map(|(delta, b)| delta * alpha + b)
            .collect();
        let grads = model.input_gradients(&batch.with_inputs(inputs), variable, target)?;
        for (sum, grad) in grad_sums.iter_mut().zip(&grads) {
            *sum += grad;
        }
    }

    Ok(deltas
        .iter()
        .zip(&grad_sums)
        .map(|(delta, grad_sum)| (delta * grad_sum / steps as f32).sum_axis(Axis(0)))
        .collect())
}
