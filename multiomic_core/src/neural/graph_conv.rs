//! Graph convolution over a normalized sample adjacency.
//!
//! Computes `H' = Â · H · W + b`, where `Â` is the symmetric-normalized
//! adjacency with self loops supplied by the caller.

use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::neural::layer::{Dense, DenseGrads};
use crate::neural::optimizer::AdamOptimizer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConv {
    linear: Dense,
}

#[derive(Debug, Clone)]
pub struct GraphConvCache {
    aggregated: Array2<f32>,
}

impl GraphConv {
    pub fn new(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            linear: Dense::new(input_dim, output_dim, rng),
        }
    }

    pub fn output_dim(&self) -> usize {
        self.linear.output_dim()
    }

    pub fn forward(&self, adjacency: &Array2<f32>, input: &Array2<f32>) -> (Array2<f32>, GraphConvCache) {
        let aggregated = adjacency.dot(input);
        let output = self.linear.forward(&aggregated);
        (output, GraphConvCache { aggregated })
    }

    pub fn backward(
        &self,
        adjacency: &Array2<f32>,
        cache: &GraphConvCache,
        grad_output: &Array2<f32>,
    ) -> (Array2<f32>, DenseGrads) {
        let (grad_aggregated, grads) = self.linear.backward(&cache.aggregated, grad_output);
        (adjacency.t().dot(&grad_aggregated), grads)
    }

    pub fn apply(&mut self, name: &str, grads: &DenseGrads, optimizer: &mut AdamOptimizer) {
        self.linear.apply(name, grads, optimizer);
    }

    pub fn num_parameters(&self) -> usize {
        self.linear.num_parameters()
    }
}
