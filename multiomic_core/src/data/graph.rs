//! Sample similarity graph for the graph encoder.

use std::collections::BTreeSet;

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsError, OmicsResult};

/// Symmetric k-nearest-neighbour graph over the samples of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleGraph {
    neighbors: Vec<BTreeSet<usize>>,
}

impl SampleGraph {
    /// Connect every sample to its `k` nearest samples (Euclidean) and
    /// symmetrize. `features` is [samples, features].
    pub fn knn(features: &Array2<f32>, k: usize) -> OmicsResult<Self> {
        if k == 0 {
            return Err(OmicsError::configuration("sample graph", "k must be at least 1"));
        }
        let n = features.nrows();
        let k = k.min(n.saturating_sub(1));

        let nearest: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = features.row(i);
                let mut distances: Vec<(usize, f32)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, squared_distance(row, features.row(j))))
                    .collect();
                distances.sort_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.0.cmp(&b.0))
                });
                distances.into_iter().take(k).map(|(j, _)| j).collect()
            })
            .collect();

        let mut neighbors = vec![BTreeSet::new(); n];
        for (i, list) in nearest.into_iter().enumerate() {
            for j in list {
                neighbors[i].insert(j);
                neighbors[j].insert(i);
            }
        }

        Ok(Self { neighbors })
    }

    pub fn num_nodes(&self) -> usize {
        self.neighbors.len()
    }

    pub fn num_edges(&self) -> usize {
        self.neighbors.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbors[node].iter().copied()
    }

    /// Induced subgraph on `nodes`, renumbered in the given order.
    pub fn restrict(&self, nodes: &[usize]) -> Self {
        let position: std::collections::HashMap<usize, usize> =
            nodes.iter().enumerate().map(|(p, &n)| (n, p)).collect();
        let neighbors = nodes
            .iter()
            .map(|&n| {
                self.neighbors[n]
                    .iter()
                    .filter_map(|m| position.get(m).copied())
                    .collect()
            })
            .collect();
        Self { neighbors }
    }

    /// `D^-1/2 (A + I) D^-1/2` over the induced subgraph on `nodes`.
    pub fn normalized_adjacency(&self, nodes: &[usize]) -> Array2<f32> {
        let sub = self.restrict(nodes);
        let n = sub.num_nodes();
        let mut adjacency = Array2::<f32>::eye(n);
        for (i, list) in sub.neighbors.iter().enumerate() {
            for &j in list {
                adjacency[[i, j]] = 1.0;
            }
        }

        let inv_sqrt_degree: Vec<f32> = adjacency
            .rows()
            .into_iter()
            .map(|row| 1.0 / row.sum().sqrt())
            .collect();
        for ((i, j), value) in adjacency.indexed_iter_mut() {
            *value *= inv_sqrt_degree[i] * inv_sqrt_degree[j];
        }
        adjacency
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
