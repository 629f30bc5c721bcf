//! Homoscedastic uncertainty weighting of multi-task losses.
//!
//! Each variable `v` owns a learnable log-variance `s_v`. With more than one
//! task the combined objective is `Σ exp(−s_v)·L_v + s_v`; a single task is
//! left unweighted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::neural::AdamOptimizer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogVariances(BTreeMap<String, f32>);

impl LogVariances {
    /// One zero-initialized log-variance per variable.
    pub fn new<S: AsRef<str>>(variables: &[S]) -> Self {
        Self(
            variables
                .iter()
                .map(|v| (v.as_ref().to_string(), 0.0))
                .collect(),
        )
    }

    pub fn get(&self, variable: &str) -> Option<f32> {
        self.0.get(variable).copied()
    }

    pub fn set(&mut self, variable: &str, value: f32) {
        if let Some(slot) = self.0.get_mut(variable) {
            *slot = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f32)> {
        self.0.iter()
    }

    pub fn apply(&mut self, grads: &BTreeMap<String, f32>, optimizer: &mut AdamOptimizer) {
        for (variable, value) in self.0.iter_mut() {
            if let Some(&grad) = grads.get(variable) {
                optimizer.step_scalar(&format!("log_var.{variable}"), value, grad);
            }
        }
    }
}

/// Combined objective with the per-task scaling applied to each gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedLoss {
    pub total: f32,
    /// Multiplier on each task's loss gradient
    pub scales: BTreeMap<String, f32>,
    /// d total / d s_v; empty when unweighted
    pub log_var_grads: BTreeMap<String, f32>,
}

pub fn combine_losses(losses: &BTreeMap<String, f32>, log_vars: Option<&LogVariances>) -> CombinedLoss {
    let weighting = log_vars.filter(|_| losses.len() > 1);

    let Some(log_vars) = weighting else {
        return CombinedLoss {
            total: losses.values().sum(),
            scales: losses.keys().map(|k| (k.clone(), 1.0)).collect(),
            log_var_grads: BTreeMap::new(),
        };
    };

    let mut total = 0.0;
    let mut scales = BTreeMap::new();
    let mut log_var_grads = BTreeMap::new();
    for (variable, &loss) in losses {
        let s = log_vars.get(variable).unwrap_or(0.0);
        let precision = (-s).exp();
        total += precision * loss + s;
        scales.insert(variable.clone(), precision);
        log_var_grads.insert(variable.clone(), 1.0 - precision * loss);
    }

    CombinedLoss {
        total,
        scales,
        log_var_grads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_single_task_is_unweighted() {
        let mut log_vars = LogVariances::new(&["age"]);
        log_vars.set("age", 2.0);
        let combined = combine_losses(&losses(&[("age", 3.5)]), Some(&log_vars));

        assert_eq!(combined.total, 3.5);
        assert_eq!(combined.scales["age"], 1.0);
        assert!(combined.log_var_grads.is_empty());
    }

    #[test]
    fn test_two_tasks_weighted() {
        let mut log_vars = LogVariances::new(&["a", "b"]);
        log_vars.set("b", 1.0);
        let combined = combine_losses(&losses(&[("a", 2.0), ("b", 4.0)]), Some(&log_vars));

        let expected = 2.0 + (-1.0f32).exp() * 4.0 + 1.0;
        assert!((combined.total - expected).abs() < 1e-6);
        assert!((combined.log_var_grads["a"] - (1.0 - 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_weighting_disabled_sums() {
        let combined = combine_losses(&losses(&[("a", 2.0), ("b", 4.0)]), None);
        assert_eq!(combined.total, 6.0);
    }

    #[test]
    fn test_log_variance_moves_toward_loss() {
        let mut log_vars = LogVariances::new(&["a", "b"]);
        let mut optimizer = AdamOptimizer::new(0.1, 0.0);
        for _ in 0..50 {
            let combined = combine_losses(&losses(&[("a", 4.0), ("b", 0.5)]), Some(&log_vars));
            log_vars.apply(&combined.log_var_grads, &mut optimizer);
        }
        // Optimum is s = ln L
        assert!(log_vars.get("a").unwrap() > 0.5);
        assert!(log_vars.get("b").unwrap() < 0.0);
    }
}
