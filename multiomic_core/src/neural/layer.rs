//! Dense layer and activation functions.
//!
//! Layers are stateless during a pass: `forward` returns the output and the
//! caller keeps whatever the matching `backward` needs. This keeps models
//! shareable across threads during prediction and attribution.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::OmicsError;
use crate::neural::optimizer::AdamOptimizer;

/// Element-wise nonlinearity applied between dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    LeakyRelu,
    Tanh,
    Sigmoid,
}

const LEAKY_SLOPE: f32 = 0.01;

impl Activation {
    pub fn apply(&self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::LeakyRelu => x.mapv(|v| if v > 0.0 { v } else { LEAKY_SLOPE * v }),
            Activation::Tanh => x.mapv(f32::tanh),
            Activation::Sigmoid => x.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative given the pre-activation and the activation output.
    pub fn derivative(&self, pre: &Array2<f32>, post: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::LeakyRelu => pre.mapv(|v| if v > 0.0 { 1.0 } else { LEAKY_SLOPE }),
            Activation::Tanh => post.mapv(|y| 1.0 - y * y),
            Activation::Sigmoid => post.mapv(|y| y * (1.0 - y)),
        }
    }
}

impl FromStr for Activation {
    type Err = OmicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "leakyrelu" | "leaky_relu" => Ok(Activation::LeakyRelu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(OmicsError::configuration(
                "activation",
                format!("unknown activation '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
        };
        f.write_str(name)
    }
}

/// Fully connected layer: `y = x · W + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix [input_dim, output_dim]
    pub weight: Array2<f32>,
    /// Bias vector [output_dim]
    pub bias: Array1<f32>,
}

/// Parameter gradients of a [`Dense`] layer.
#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Dense {
    /// He-scaled uniform initialization.
    pub fn new(input_dim: usize, output_dim: usize, rng: &mut StdRng) -> Self {
        let scale = (2.0 / input_dim.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((input_dim, output_dim), |_| {
            (rng.gen::<f32>() - 0.5) * 2.0 * scale
        });

        Self {
            weight,
            bias: Array1::zeros(output_dim),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.weight) + &self.bias
    }

    /// Returns (gradient w.r.t. input, parameter gradients).
    pub fn backward(&self, input: &Array2<f32>, grad_output: &Array2<f32>) -> (Array2<f32>, DenseGrads) {
        let grads = DenseGrads {
            weight: input.t().dot(grad_output),
            bias: grad_output.sum_axis(Axis(0)),
        };
        let grad_input = grad_output.dot(&self.weight.t());
        (grad_input, grads)
    }

    pub fn apply(&mut self, name: &str, grads: &DenseGrads, optimizer: &mut AdamOptimizer) {
        optimizer.step(&format!("{name}.weight"), &mut self.weight, &grads.weight);
        optimizer.step(&format!("{name}.bias"), &mut self.bias, &grads.bias);
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
