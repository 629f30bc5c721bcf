//! Feed-forward encoder trained with an extra triplet margin objective.
//!
//! For every anchor in a batch the hardest positive (farthest sample of the
//! same class) and hardest negative (closest sample of another class) are
//! chosen; the loss is `mean max(0, d(a,p) − d(a,n) + margin)` with squared
//! Euclidean distances.

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::dataset::Batch;
use crate::error::OmicsResult;
use crate::model::encoder::{base_schema, AuxiliaryLoss, Encoder, Mode};
use crate::model::feed_forward::FeedForwardEncoder;
use crate::neural::{AdamOptimizer, MlpCache, MlpGrads};
use crate::tuning::space::{EncoderKind, HyperParams, ParamKind, ParamRequirement};

const DEFAULT_MARGIN: f32 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripletEncoder {
    base: FeedForwardEncoder,
    margin: f32,
}

impl TripletEncoder {
    pub fn margin(&self) -> f32 {
        self.margin
    }
}

impl Encoder for TripletEncoder {
    type Trace = Vec<MlpCache>;
    type Grads = Vec<MlpGrads>;

    const KIND: EncoderKind = EncoderKind::Triplet;

    fn schema() -> Vec<ParamRequirement> {
        let mut schema = base_schema();
        schema.push(ParamRequirement::new("margin", ParamKind::PositiveReal));
        schema
    }

    fn build(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self> {
        Ok(Self {
            base: FeedForwardEncoder::new(input_dims, params, rng)?,
            margin: params.f32_or("margin", DEFAULT_MARGIN)?,
        })
    }

    fn input_dims(&self) -> Vec<usize> {
        self.base.input_dims()
    }

    fn embedding_dim(&self) -> usize {
        self.base.embedding_dim()
    }

    fn encode(&self, batch: &Batch, _mode: Mode, _rng: &mut StdRng) -> OmicsResult<(Array2<f32>, Self::Trace)> {
        self.base.forward_blocks(batch)
    }

    fn auxiliary_loss(
        &self,
        _trace: &Self::Trace,
        embedding: &Array2<f32>,
        anchors: &[Option<usize>],
    ) -> AuxiliaryLoss {
        triplet_margin_loss(embedding, anchors, self.margin)
    }

    fn backward(
        &self,
        trace: &Self::Trace,
        grad_embedding: &Array2<f32>,
        _with_auxiliary: bool,
    ) -> (Self::Grads, Vec<Array2<f32>>) {
        self.base.backward_blocks(trace, grad_embedding)
    }

    fn apply(&mut self, grads: &Self::Grads, optimizer: &mut AdamOptimizer) {
        self.base.apply_blocks("encoder", grads, optimizer);
    }

    fn num_parameters(&self) -> usize {
        self.base.num_parameters()
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

pub(crate) fn triplet_margin_loss(
    embedding: &Array2<f32>,
    anchors: &[Option<usize>],
    margin: f32,
) -> AuxiliaryLoss {
    let n = embedding.nrows();
    let mut triplets = Vec::new();

    for (a, class) in anchors.iter().enumerate() {
        let Some(class) = class else { continue };
        let mut positive: Option<(usize, f32)> = None;
        let mut negative: Option<(usize, f32)> = None;

        for (j, other) in anchors.iter().enumerate() {
            if j == a {
                continue;
            }
            let Some(other) = other else { continue };
            let d = squared_distance(embedding.row(a), embedding.row(j));
            if other == class {
                if positive.map_or(true, |(_, best)| d > best) {
                    positive = Some((j, d));
                }
            } else if negative.map_or(true, |(_, best)| d < best) {
                negative = Some((j, d));
            }
        }

        if let (Some((p, dp)), Some((q, dn))) = (positive, negative) {
            let violation = dp - dn + margin;
            if violation > 0.0 {
                triplets.push((a, p, q, violation));
            }
        }
    }

    let anchors_with_pairs = anchors
        .iter()
        .enumerate()
        .filter(|(a, c)| {
            c.is_some()
                && anchors.iter().enumerate().any(|(j, o)| j != *a && *o == **c)
                && anchors.iter().any(|o| o.is_some() && *o != **c)
        })
        .count();
    if anchors_with_pairs == 0 {
        return AuxiliaryLoss::none();
    }

    let count = anchors_with_pairs as f32;
    let mut grad = Array2::zeros((n, embedding.ncols()));
    let mut value = 0.0;
    for (a, p, q, violation) in triplets {
        value += violation;
        let anchor = embedding.row(a).to_owned();
        let pos = embedding.row(p).to_owned();
        let neg = embedding.row(q).to_owned();
        // d(a,p) − d(a,n) with squared distances
        let grad_anchor = (&neg - &pos) * (2.0 / count);
        let grad_pos = (&pos - &anchor) * (2.0 / count);
        let grad_neg = (&anchor - &neg) * (2.0 / count);
        {
            let mut row = grad.row_mut(a);
            row += &grad_anchor;
        }
        {
            let mut row = grad.row_mut(p);
            row += &grad_pos;
        }
        {
            let mut row = grad.row_mut(q);
            row += &grad_neg;
        }
    }

    AuxiliaryLoss {
        value: value / count,
        grad_embedding: Some(grad),
    }
}
