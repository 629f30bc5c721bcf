//! Two-layer graph convolutional encoder over the sample graph.
//!
//! Inputs are concatenated per sample and propagated along the normalized
//! adjacency of the batch: `H1 = act(Â X W1)`, `Z = Â H1 W2`.

use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::dataset::Batch;
use crate::error::{OmicsError, OmicsResult};
use crate::model::encoder::{
    activation_param, base_schema, check_inputs, concat_columns, hidden_width, split_columns, Encoder, Mode,
};
use crate::neural::{Activation, AdamOptimizer, DenseGrads, GraphConv, GraphConvCache};
use crate::tuning::space::{EncoderKind, HyperParams, ParamRequirement};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEncoder {
    first: GraphConv,
    second: GraphConv,
    activation: Activation,
    input_dims: Vec<usize>,
}

#[derive(Debug)]
pub struct GraphTrace {
    adjacency: Array2<f32>,
    first: GraphConvCache,
    pre: Array2<f32>,
    post: Array2<f32>,
    second: GraphConvCache,
}

pub struct GraphGrads {
    first: DenseGrads,
    second: DenseGrads,
}

impl Encoder for GraphEncoder {
    type Trace = GraphTrace;
    type Grads = GraphGrads;

    const KIND: EncoderKind = EncoderKind::Graph;
    const REQUIRES_GRAPH: bool = true;

    fn schema() -> Vec<ParamRequirement> {
        base_schema()
    }

    fn build(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self> {
        let latent_dim = params.usize("latent_dim")?;
        let factor = params.f32("hidden_dim_factor")?;
        let total: usize = input_dims.iter().sum();
        let hidden = hidden_width(total, factor);

        Ok(Self {
            first: GraphConv::new(total, hidden, rng),
            second: GraphConv::new(hidden, latent_dim, rng),
            activation: activation_param(params)?,
            input_dims: input_dims.to_vec(),
        })
    }

    fn input_dims(&self) -> Vec<usize> {
        self.input_dims.clone()
    }

    fn embedding_dim(&self) -> usize {
        self.second.output_dim()
    }

    fn encode(&self, batch: &Batch, _mode: Mode, _rng: &mut StdRng) -> OmicsResult<(Array2<f32>, Self::Trace)> {
        check_inputs(batch, &self.input_dims)?;
        let adjacency = batch
            .adjacency
            .clone()
            .ok_or_else(|| OmicsError::configuration("graph encoder", "batch carries no sample graph"))?;
        if adjacency.dim() != (batch.len(), batch.len()) {
            return Err(OmicsError::dimension_mismatch(
                batch.len(),
                adjacency.nrows(),
                "adjacency rows",
            ));
        }

        let features = concat_columns(&batch.inputs)?;
        let (pre, first) = self.first.forward(&adjacency, &features);
        let post = self.activation.apply(&pre);
        let (embedding, second) = self.second.forward(&adjacency, &post);

        Ok((
            embedding,
            GraphTrace {
                adjacency,
                first,
                pre,
                post,
                second,
            },
        ))
    }

    fn backward(
        &self,
        trace: &Self::Trace,
        grad_embedding: &Array2<f32>,
        _with_auxiliary: bool,
    ) -> (Self::Grads, Vec<Array2<f32>>) {
        let (grad_post, second) = self.second.backward(&trace.adjacency, &trace.second, grad_embedding);
        let grad_pre = grad_post * self.activation.derivative(&trace.pre, &trace.post);
        let (grad_features, first) = self.first.backward(&trace.adjacency, &trace.first, &grad_pre);

        (GraphGrads { first, second }, split_columns(&grad_features, &self.input_dims))
    }

    fn apply(&mut self, grads: &Self::Grads, optimizer: &mut AdamOptimizer) {
        self.first.apply("encoder.gc1", &grads.first, optimizer);
        self.second.apply("encoder.gc2", &grads.second, optimizer);
    }

    fn num_parameters(&self) -> usize {
        self.first.num_parameters() + self.second.num_parameters()
    }
}
