//! Encoder abstraction shared by every architecture.
//!
//! An encoder maps the input matrices of a [`Batch`] to one latent embedding
//! per sample. `encode` returns the embedding plus a trace holding whatever
//! `backward` needs, so encoders stay immutable (and `Sync`) during a pass.

use std::fmt::Debug;

use ndarray::{s, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data::dataset::Batch;
use crate::error::{OmicsError, OmicsResult};
use crate::neural::{Activation, AdamOptimizer};
use crate::tuning::space::{EncoderKind, HyperParams, ParamKind, ParamRequirement};

/// Whether stochastic parts of an encoder are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Encoder-specific training objective added to the supervised losses.
#[derive(Debug, Clone)]
pub struct AuxiliaryLoss {
    pub value: f32,
    /// Gradient w.r.t. the embedding; losses on internal activations are
    /// instead handled by `backward` with `with_auxiliary = true`
    pub grad_embedding: Option<Array2<f32>>,
}

impl AuxiliaryLoss {
    pub fn none() -> Self {
        Self {
            value: 0.0,
            grad_embedding: None,
        }
    }
}

pub trait Encoder: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// Activations recorded by `encode` for `backward`
    type Trace: Send;
    /// Parameter gradients
    type Grads: Send;

    const KIND: EncoderKind;
    /// Needs `Batch::adjacency`
    const REQUIRES_GRAPH: bool = false;

    /// Hyperparameters `build` reads.
    fn schema() -> Vec<ParamRequirement>;

    fn build(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self>;

    fn input_dims(&self) -> Vec<usize>;

    fn embedding_dim(&self) -> usize;

    fn encode(&self, batch: &Batch, mode: Mode, rng: &mut StdRng) -> OmicsResult<(Array2<f32>, Self::Trace)>;

    /// `anchors` holds one optional class per batch row for encoders that
    /// contrast samples.
    fn auxiliary_loss(
        &self,
        _trace: &Self::Trace,
        _embedding: &Array2<f32>,
        _anchors: &[Option<usize>],
    ) -> AuxiliaryLoss {
        AuxiliaryLoss::none()
    }

    /// Returns parameter gradients and one gradient per input matrix.
    fn backward(
        &self,
        trace: &Self::Trace,
        grad_embedding: &Array2<f32>,
        with_auxiliary: bool,
    ) -> (Self::Grads, Vec<Array2<f32>>);

    fn apply(&mut self, grads: &Self::Grads, optimizer: &mut AdamOptimizer);

    fn num_parameters(&self) -> usize;
}

pub(crate) fn base_schema() -> Vec<ParamRequirement> {
    vec![
        ParamRequirement::new("latent_dim", ParamKind::PositiveInteger),
        ParamRequirement::new("hidden_dim_factor", ParamKind::PositiveReal),
    ]
}

pub(crate) fn activation_param(params: &HyperParams) -> OmicsResult<Activation> {
    params.text_or("activation", "relu")?.parse()
}

/// Hidden width of a per-layer block: `round(input · factor)`, at least 1.
pub(crate) fn hidden_width(input_dim: usize, factor: f32) -> usize {
    ((input_dim as f32 * factor).round() as usize).max(1)
}

pub(crate) fn check_inputs(batch: &Batch, expected: &[usize]) -> OmicsResult<()> {
    if batch.inputs.len() != expected.len() {
        return Err(OmicsError::dimension_mismatch(
            expected.len(),
            batch.inputs.len(),
            "number of input layers",
        ));
    }
    for (i, (input, &dim)) in batch.inputs.iter().zip(expected).enumerate() {
        if input.ncols() != dim {
            return Err(OmicsError::dimension_mismatch(
                dim,
                input.ncols(),
                format!("features of input layer {i}"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn concat_columns(blocks: &[Array2<f32>]) -> OmicsResult<Array2<f32>> {
    let views: Vec<ArrayView2<f32>> = blocks.iter().map(Array2::view).collect();
    ndarray::concatenate(Axis(1), &views)
        .map_err(|err| OmicsError::configuration("embedding concatenation", err.to_string()))
}

/// Split columns into consecutive blocks of the given widths.
pub(crate) fn split_columns(matrix: &Array2<f32>, widths: &[usize]) -> Vec<Array2<f32>> {
    let mut offset = 0;
    widths
        .iter()
        .map(|&w| {
            let block = matrix.slice(s![.., offset..offset + w]).to_owned();
            offset += w;
            block
        })
        .collect()
}
