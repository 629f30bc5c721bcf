//! Adam optimizer with per-parameter moment estimates.

use std::collections::BTreeMap;

use ndarray::{arr0, Array, ArrayD, Dimension, Zip};
use serde::{Deserialize, Serialize};

/// Adam optimizer (Adaptive Moment Estimation).
///
/// Moments and step counts are keyed by parameter name, so every parameter
/// must be updated under a stable, unique name across steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamOptimizer {
    /// Learning rate
    pub learning_rate: f32,
    /// Exponential decay rate for first moment (typically 0.9)
    pub beta1: f32,
    /// Exponential decay rate for second moment (typically 0.999)
    pub beta2: f32,
    /// Small constant for numerical stability
    pub epsilon: f32,
    /// L2 weight decay
    pub weight_decay: f32,
    first_moments: BTreeMap<String, ArrayD<f32>>,
    second_moments: BTreeMap<String, ArrayD<f32>>,
    steps: BTreeMap<String, i32>,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f32, weight_decay: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            first_moments: BTreeMap::new(),
            second_moments: BTreeMap::new(),
            steps: BTreeMap::new(),
        }
    }

    /// Updates a parameter in place.
    pub fn step<D: Dimension>(
        &mut self,
        param_name: &str,
        param: &mut Array<f32, D>,
        gradient: &Array<f32, D>,
    ) {
        let t = self.steps.entry(param_name.to_string()).or_insert(0);
        *t += 1;
        let t = *t;

        let shape = param.raw_dim().into_dyn();
        let m = self
            .first_moments
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(shape.clone()));
        let v = self
            .second_moments
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(shape));

        let (beta1, beta2, eps, lr, decay) = (
            self.beta1,
            self.beta2,
            self.epsilon,
            self.learning_rate,
            self.weight_decay,
        );
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);

        Zip::from(param.view_mut().into_dyn())
            .and(gradient.view().into_dyn())
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                let g = g + decay * *p;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }

    /// Updates a single learnable scalar.
    pub fn step_scalar(&mut self, param_name: &str, value: &mut f32, gradient: f32) {
        let mut param = arr0(*value);
        self.step(param_name, &mut param, &arr0(gradient));
        *value = param[()];
    }

    /// Resets all accumulated moments.
    pub fn zero_grad(&mut self) {
        self.first_moments.clear();
        self.second_moments.clear();
        self.steps.clear();
    }
}
