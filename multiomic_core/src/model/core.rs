//! Multi-task supervised model: one encoder, one head per variable.
//!
//! Lifecycle: `Configured` after construction, `Training` from the first
//! [`ModelCore::train_step`], `Trained` after [`ModelCore::finish_training`].
//! Prediction, embedding and attribution need a trained model; training a
//! trained model needs an explicit [`ModelCore::refit`].

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::data::dataset::{Batch, FeatureId, MultiOmicDataset, SurvivalPair};
use crate::data::variable::VariableType;
use crate::error::{OmicsError, OmicsResult};
use crate::model::encoder::{Encoder, Mode};
use crate::model::weighting::{combine_losses, CombinedLoss, LogVariances};
use crate::neural::{
    cox_ph_loss, masked_cross_entropy, masked_mse, softmax_rows, Activation, AdamOptimizer, LossOutput, Mlp,
    MlpCache,
};
use crate::tuning::space::{HyperParams, ParamKind, ParamRequirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Configured,
    Training,
    Trained,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelState::Configured => f.write_str("configured"),
            ModelState::Training => f.write_str("training"),
            ModelState::Trained => f.write_str("trained"),
        }
    }
}

/// Construction options that are not searched over.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub use_loss_weighting: bool,
    pub weight_decay: f32,
    pub seed: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            use_loss_weighting: true,
            weight_decay: 0.0,
            seed: 42,
        }
    }
}

impl From<&TrainingConfig> for ModelOptions {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            use_loss_weighting: config.use_loss_weighting,
            weight_decay: config.weight_decay,
            seed: config.seed,
        }
    }
}

/// Losses of one optimization step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub total: f32,
    pub task_losses: BTreeMap<String, f32>,
    pub auxiliary: f32,
}

/// Model output for one variable over a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// [samples, 1]: arg-max class index for categorical variables, raw
    /// output (value or log-risk) otherwise
    pub values: Array2<f32>,
    /// Class probabilities for categorical variables
    pub probabilities: Option<Array2<f32>>,
}

impl Prediction {
    /// Class indices of a categorical prediction.
    pub fn classes(&self) -> Option<Vec<usize>> {
        self.probabilities
            .as_ref()
            .map(|_| self.values.column(0).iter().map(|&c| c as usize).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub samples: Vec<String>,
    pub variables: BTreeMap<String, Prediction>,
}

impl Predictions {
    pub fn get(&self, variable: &str) -> Option<&Prediction> {
        self.variables.get(variable)
    }
}

/// Latent embedding per sample, columns `E0..E{d-1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    pub samples: Vec<String>,
    pub columns: Vec<String>,
    pub values: Array2<f32>,
}

impl EmbeddingTable {
    pub fn row(&self, sample: &str) -> Option<Array1<f32>> {
        self.samples
            .iter()
            .position(|s| s == sample)
            .map(|i| self.values.row(i).to_owned())
    }
}

struct ForwardPass<T> {
    embedding: Array2<f32>,
    trace: T,
    outputs: BTreeMap<String, Array2<f32>>,
    head_caches: BTreeMap<String, MlpCache>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "E: Encoder")]
pub struct ModelCore<E> {
    encoder: E,
    heads: BTreeMap<String, Mlp>,
    variables: Vec<String>,
    variable_types: BTreeMap<String, VariableType>,
    label_mappings: BTreeMap<String, Vec<String>>,
    survival: Option<SurvivalPair>,
    anchor_variable: Option<String>,
    log_vars: Option<LogVariances>,
    params: HyperParams,
    feature_ids: Vec<Vec<FeatureId>>,
    optimizer: AdamOptimizer,
    state: ModelState,
    seed: u64,
    steps: u64,
}

fn core_schema() -> Vec<ParamRequirement> {
    vec![
        ParamRequirement::new("lr", ParamKind::PositiveReal),
        ParamRequirement::new("supervisor_hidden_dim", ParamKind::PositiveInteger),
    ]
}

impl<E: Encoder> ModelCore<E> {
    /// Build a model for every head variable of `dataset`.
    pub fn new(dataset: &MultiOmicDataset, params: HyperParams, options: &ModelOptions) -> OmicsResult<Self> {
        params.validate(&core_schema())?;
        params.validate(&E::schema())?;
        if E::REQUIRES_GRAPH && dataset.graph().is_none() {
            return Err(OmicsError::configuration(
                format!("{} encoder", E::KIND),
                "dataset has no sample graph (use with_sample_graph)",
            ));
        }

        let variables = dataset.head_variables();
        if variables.is_empty() {
            return Err(OmicsError::configuration("model", "no variables to predict"));
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let encoder = E::build(&dataset.input_dims(), &params, &mut rng)?;
        let supervisor_hidden = params.usize("supervisor_hidden_dim")?;

        let mut variable_types = BTreeMap::new();
        let mut heads = BTreeMap::new();
        for variable in &variables {
            let kind = dataset.variable_type(variable).ok_or_else(|| {
                OmicsError::configuration("model", format!("unknown variable '{variable}'"))
            })?;
            let outputs = match kind {
                VariableType::Categorical => dataset
                    .label_encoding(variable)
                    .map(|e| e.num_classes())
                    .ok_or_else(|| {
                        OmicsError::configuration("model", format!("no classes for '{variable}'"))
                    })?,
                VariableType::Numerical | VariableType::SurvivalEvent => 1,
            };
            let head = Mlp::new(
                encoder.embedding_dim(),
                supervisor_hidden,
                outputs,
                Activation::Relu,
                &mut rng,
            );
            variable_types.insert(variable.clone(), kind);
            heads.insert(variable.clone(), head);
        }

        let anchor_variable = dataset
            .target_variables()
            .iter()
            .find(|v| variable_types.get(*v) == Some(&VariableType::Categorical))
            .or_else(|| dataset.target_variables().first())
            .or_else(|| variables.first())
            .cloned();

        let log_vars = options
            .use_loss_weighting
            .then(|| LogVariances::new(&variables));
        let optimizer = AdamOptimizer::new(params.f32("lr")?, options.weight_decay);

        let model = Self {
            encoder,
            heads,
            variables,
            variable_types,
            label_mappings: dataset.label_mappings(),
            survival: dataset.survival().cloned(),
            anchor_variable,
            log_vars,
            params,
            feature_ids: dataset.layers().iter().map(|l| l.features.clone()).collect(),
            optimizer,
            state: ModelState::Configured,
            seed: options.seed,
            steps: 0,
        };

        tracing::debug!(
            encoder = %E::KIND,
            parameters = model.num_parameters(),
            heads = model.heads.len(),
            "model configured"
        );
        Ok(model)
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Variables with a head, in training order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn variable_type(&self, variable: &str) -> Option<VariableType> {
        self.variable_types.get(variable).copied()
    }

    pub fn label_mappings(&self) -> &BTreeMap<String, Vec<String>> {
        &self.label_mappings
    }

    pub fn log_variances(&self) -> Option<&LogVariances> {
        self.log_vars.as_ref()
    }

    pub fn feature_ids(&self) -> &[Vec<FeatureId>] {
        &self.feature_ids
    }

    pub fn num_parameters(&self) -> usize {
        self.encoder.num_parameters() + self.heads.values().map(Mlp::num_parameters).sum::<usize>()
    }

    fn forward_pass(&self, batch: &Batch, mode: Mode, rng: &mut StdRng) -> OmicsResult<ForwardPass<E::Trace>> {
        let (embedding, trace) = self.encoder.encode(batch, mode, rng)?;
        let mut outputs = BTreeMap::new();
        let mut head_caches = BTreeMap::new();
        for (variable, head) in &self.heads {
            let (output, cache) = head.forward(&embedding);
            outputs.insert(variable.clone(), output);
            head_caches.insert(variable.clone(), cache);
        }
        Ok(ForwardPass {
            embedding,
            trace,
            outputs,
            head_caches,
        })
    }

    /// Raw head outputs in evaluation mode.
    pub fn forward(&self, batch: &Batch) -> OmicsResult<BTreeMap<String, Array2<f32>>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(self.forward_pass(batch, Mode::Eval, &mut rng)?.outputs)
    }

    /// Loss of one variable's head output against the batch labels.
    pub fn loss(&self, variable: &str, batch: &Batch, output: &Array2<f32>) -> OmicsResult<LossOutput> {
        let kind = self.variable_type(variable).ok_or_else(|| {
            OmicsError::configuration("loss", format!("model has no head for '{variable}'"))
        })?;
        let labels = batch.label(variable)?;

        match kind {
            VariableType::Numerical => Ok(masked_mse(labels, output)),
            VariableType::Categorical => Ok(masked_cross_entropy(labels, output)),
            VariableType::SurvivalEvent => {
                let pair = self.survival.as_ref().ok_or_else(|| {
                    OmicsError::configuration("loss", format!("no survival time for '{variable}'"))
                })?;
                let durations = batch.label(&pair.time)?;
                Ok(cox_ph_loss(output, durations, labels))
            }
        }
    }

    pub fn combine_losses(&self, losses: &BTreeMap<String, f32>) -> CombinedLoss {
        combine_losses(losses, self.log_vars.as_ref())
    }

    /// One optimization step over `batch`.
    ///
    /// A non-finite loss aborts the step before any parameter changes.
    pub fn train_step(&mut self, batch: &Batch) -> OmicsResult<StepReport> {
        match self.state {
            ModelState::Trained => return Err(OmicsError::invalid_state("train_step", self.state)),
            ModelState::Configured => self.state = ModelState::Training,
            ModelState::Training => {}
        }

        self.steps += 1;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.steps));
        let pass = self.forward_pass(batch, Mode::Train, &mut rng)?;

        let mut task_losses = BTreeMap::new();
        let mut gradients = BTreeMap::new();
        for (variable, output) in &pass.outputs {
            let loss = self.loss(variable, batch, output)?;
            task_losses.insert(variable.clone(), loss.value);
            gradients.insert(variable.clone(), loss.gradient);
        }

        let combined = self.combine_losses(&task_losses);
        let anchors = self.anchor_classes(batch);
        let auxiliary = self.encoder.auxiliary_loss(&pass.trace, &pass.embedding, &anchors);
        let total = combined.total + auxiliary.value;
        if !total.is_finite() {
            return Err(OmicsError::instability(
                0,
                format!("non-finite training loss at step {}", self.steps),
            ));
        }

        let mut grad_embedding = Array2::<f32>::zeros(pass.embedding.dim());
        let mut head_grads = BTreeMap::new();
        for (variable, head) in &self.heads {
            let scale = combined.scales.get(variable).copied().unwrap_or(1.0);
            let grad_output = &gradients[variable] * scale;
            let (grad_in, grads) = head.backward(&pass.head_caches[variable], &grad_output);
            grad_embedding += &grad_in;
            head_grads.insert(variable.clone(), grads);
        }
        if let Some(grad) = &auxiliary.grad_embedding {
            grad_embedding += grad;
        }
        let (encoder_grads, _) = self.encoder.backward(&pass.trace, &grad_embedding, true);

        for (variable, head) in self.heads.iter_mut() {
            if let Some(grads) = head_grads.get(variable) {
                head.apply(&format!("head.{variable}"), grads, &mut self.optimizer);
            }
        }
        self.encoder.apply(&encoder_grads, &mut self.optimizer);
        if let Some(log_vars) = self.log_vars.as_mut() {
            log_vars.apply(&combined.log_var_grads, &mut self.optimizer);
        }

        Ok(StepReport {
            total,
            task_losses,
            auxiliary: auxiliary.value,
        })
    }

    /// Combined supervised loss over the whole dataset in evaluation mode.
    pub fn validation_loss(&self, dataset: &MultiOmicDataset) -> OmicsResult<f32> {
        let batch = dataset.full_batch();
        let outputs = self.forward(&batch)?;
        let mut losses = BTreeMap::new();
        for (variable, output) in &outputs {
            losses.insert(variable.clone(), self.loss(variable, &batch, output)?.value);
        }
        Ok(self.combine_losses(&losses).total)
    }

    pub fn finish_training(&mut self) {
        self.state = ModelState::Trained;
    }

    /// Allow further training of a trained model.
    pub fn refit(&mut self) {
        if self.state == ModelState::Trained {
            self.state = ModelState::Training;
        }
    }

    fn require_trained(&self, operation: &str) -> OmicsResult<()> {
        if self.state == ModelState::Trained {
            Ok(())
        } else {
            Err(OmicsError::invalid_state(operation, self.state))
        }
    }

    /// Predictions for every sample, in dataset order.
    pub fn predict(&self, dataset: &MultiOmicDataset) -> OmicsResult<Predictions> {
        self.require_trained("predict")?;
        let outputs = self.forward(&dataset.full_batch())?;

        let variables = outputs
            .into_iter()
            .map(|(variable, output)| {
                let prediction = match self.variable_type(&variable) {
                    Some(VariableType::Categorical) => {
                        let probabilities = softmax_rows(&output);
                        let classes = probabilities
                            .rows()
                            .into_iter()
                            .map(|row| argmax(row.iter().copied()) as f32)
                            .collect::<Array1<f32>>();
                        Prediction {
                            values: classes.insert_axis(Axis(1)),
                            probabilities: Some(probabilities),
                        }
                    }
                    _ => Prediction {
                        values: output,
                        probabilities: None,
                    },
                };
                (variable, prediction)
            })
            .collect();

        Ok(Predictions {
            samples: dataset.samples().to_vec(),
            variables,
        })
    }

    /// Latent embedding for every sample, in dataset order.
    pub fn transform(&self, dataset: &MultiOmicDataset) -> OmicsResult<EmbeddingTable> {
        self.require_trained("transform")?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (values, _) = self.encoder.encode(&dataset.full_batch(), Mode::Eval, &mut rng)?;
        let columns = (0..values.ncols()).map(|i| format!("E{i}")).collect();

        Ok(EmbeddingTable {
            samples: dataset.samples().to_vec(),
            columns,
            values,
        })
    }

    /// Gradient of one output column of `variable` w.r.t. every input matrix.
    ///
    /// `class` picks the logit of a categorical head; scalar heads use column 0.
    pub fn input_gradients(
        &self,
        batch: &Batch,
        variable: &str,
        class: Option<usize>,
    ) -> OmicsResult<Vec<Array2<f32>>> {
        self.require_trained("input_gradients")?;
        let head = self.heads.get(variable).ok_or_else(|| {
            OmicsError::configuration("attribution", format!("model has no head for '{variable}'"))
        })?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let (embedding, trace) = self.encoder.encode(batch, Mode::Eval, &mut rng)?;
        let (output, cache) = head.forward(&embedding);

        let column = class.unwrap_or(0);
        if column >= output.ncols() {
            return Err(OmicsError::dimension_mismatch(
                output.ncols(),
                column + 1,
                format!("output classes of '{variable}'"),
            ));
        }
        let mut grad_output = Array2::zeros(output.dim());
        grad_output.column_mut(column).fill(1.0);

        let (grad_embedding, _) = head.backward(&cache, &grad_output);
        let (_, input_grads) = self.encoder.backward(&trace, &grad_embedding, false);
        Ok(input_grads)
    }

    /// Class per batch row used by contrastive auxiliary losses.
    ///
    /// Categorical anchors use the class index; other anchors split the batch
    /// at its median.
    fn anchor_classes(&self, batch: &Batch) -> Vec<Option<usize>> {
        let Some(labels) = self
            .anchor_variable
            .as_ref()
            .and_then(|v| batch.labels.get(v))
        else {
            return vec![None; batch.len()];
        };

        let categorical = self
            .anchor_variable
            .as_ref()
            .and_then(|v| self.variable_type(v))
            == Some(VariableType::Categorical);
        if categorical {
            return labels
                .iter()
                .map(|&v| (v >= 0.0 && !v.is_nan()).then(|| v as usize))
                .collect();
        }

        let mut present: Vec<f32> = labels.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.is_empty() {
            return vec![None; batch.len()];
        }
        present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = present[present.len() / 2];
        labels
            .iter()
            .map(|&v| (!v.is_nan()).then(|| usize::from(v >= median)))
            .collect()
    }
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}
