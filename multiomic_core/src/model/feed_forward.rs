//! Per-layer feed-forward encoder.
//!
//! Each input matrix passes through its own two-layer block; the per-layer
//! embeddings are concatenated. With early fusion there is a single block.

use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::dataset::Batch;
use crate::error::OmicsResult;
use crate::model::encoder::{
    activation_param, base_schema, check_inputs, concat_columns, hidden_width, split_columns, Encoder, Mode,
};
use crate::neural::{AdamOptimizer, Mlp, MlpCache, MlpGrads};
use crate::tuning::space::{EncoderKind, HyperParams, ParamRequirement};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardEncoder {
    blocks: Vec<Mlp>,
    latent_dim: usize,
}

impl FeedForwardEncoder {
    pub(crate) fn new(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self> {
        let latent_dim = params.usize("latent_dim")?;
        let factor = params.f32("hidden_dim_factor")?;
        let activation = activation_param(params)?;

        let blocks = input_dims
            .iter()
            .map(|&dim| Mlp::new(dim, hidden_width(dim, factor), latent_dim, activation, rng))
            .collect();

        Ok(Self { blocks, latent_dim })
    }

    pub(crate) fn forward_blocks(&self, batch: &Batch) -> OmicsResult<(Array2<f32>, Vec<MlpCache>)> {
        check_inputs(batch, &self.input_dims())?;
        let (outputs, caches): (Vec<_>, Vec<_>) = self
            .blocks
            .iter()
            .zip(&batch.inputs)
            .map(|(block, input)| block.forward(input))
            .unzip();
        Ok((concat_columns(&outputs)?, caches))
    }

    pub(crate) fn backward_blocks(
        &self,
        caches: &[MlpCache],
        grad_embedding: &Array2<f32>,
    ) -> (Vec<MlpGrads>, Vec<Array2<f32>>) {
        let widths = vec![self.latent_dim; self.blocks.len()];
        let (input_grads, grads): (Vec<_>, Vec<_>) = self
            .blocks
            .iter()
            .zip(caches)
            .zip(split_columns(grad_embedding, &widths))
            .map(|((block, cache), grad)| block.backward(cache, &grad))
            .unzip();
        (grads, input_grads)
    }

    pub(crate) fn apply_blocks(&mut self, prefix: &str, grads: &[MlpGrads], optimizer: &mut AdamOptimizer) {
        for (i, (block, grad)) in self.blocks.iter_mut().zip(grads).enumerate() {
            block.apply(&format!("{prefix}.{i}"), grad, optimizer);
        }
    }
}

impl Encoder for FeedForwardEncoder {
    type Trace = Vec<MlpCache>;
    type Grads = Vec<MlpGrads>;

    const KIND: EncoderKind = EncoderKind::FeedForward;

    fn schema() -> Vec<ParamRequirement> {
        base_schema()
    }

    fn build(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self> {
        Self::new(input_dims, params, rng)
    }

    fn input_dims(&self) -> Vec<usize> {
        self.blocks.iter().map(Mlp::input_dim).collect()
    }

    fn embedding_dim(&self) -> usize {
        self.latent_dim * self.blocks.len()
    }

    fn encode(&self, batch: &Batch, _mode: Mode, _rng: &mut StdRng) -> OmicsResult<(Array2<f32>, Self::Trace)> {
        self.forward_blocks(batch)
    }

    fn backward(
        &self,
        trace: &Self::Trace,
        grad_embedding: &Array2<f32>,
        _with_auxiliary: bool,
    ) -> (Self::Grads, Vec<Array2<f32>>) {
        self.backward_blocks(trace, grad_embedding)
    }

    fn apply(&mut self, grads: &Self::Grads, optimizer: &mut AdamOptimizer) {
        self.apply_blocks("encoder", grads, optimizer);
    }

    fn num_parameters(&self) -> usize {
        self.blocks.iter().map(Mlp::num_parameters).sum()
    }
}
