//! Two-layer perceptron block: Input → Hidden (activation) → Output.
//!
//! Used both as per-layer encoder and as supervisory head.

use ndarray::Array2;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::neural::layer::{Activation, Dense, DenseGrads};
use crate::neural::optimizer::AdamOptimizer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    hidden: Dense,
    output: Dense,
    activation: Activation,
}

/// Intermediate activations of one forward pass.
#[derive(Debug, Clone)]
pub struct MlpCache {
    input: Array2<f32>,
    pre: Array2<f32>,
    post: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct MlpGrads {
    pub hidden: DenseGrads,
    pub output: DenseGrads,
}

impl Mlp {
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let hidden_dim = hidden_dim.max(1);
        Self {
            hidden: Dense::new(input_dim, hidden_dim, rng),
            output: Dense::new(hidden_dim, output_dim, rng),
            activation,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.hidden.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.output.output_dim()
    }

    pub fn forward(&self, input: &Array2<f32>) -> (Array2<f32>, MlpCache) {
        let pre = self.hidden.forward(input);
        let post = self.activation.apply(&pre);
        let output = self.output.forward(&post);

        (
            output,
            MlpCache {
                input: input.clone(),
                pre,
                post,
            },
        )
    }

    /// Forward pass without keeping intermediate activations.
    pub fn infer(&self, input: &Array2<f32>) -> Array2<f32> {
        let post = self.activation.apply(&self.hidden.forward(input));
        self.output.forward(&post)
    }

    pub fn backward(&self, cache: &MlpCache, grad_output: &Array2<f32>) -> (Array2<f32>, MlpGrads) {
        let (grad_post, output_grads) = self.output.backward(&cache.post, grad_output);
        let grad_pre = grad_post * self.activation.derivative(&cache.pre, &cache.post);
        let (grad_input, hidden_grads) = self.hidden.backward(&cache.input, &grad_pre);

        (
            grad_input,
            MlpGrads {
                hidden: hidden_grads,
                output: output_grads,
            },
        )
    }

    pub fn apply(&mut self, name: &str, grads: &MlpGrads, optimizer: &mut AdamOptimizer) {
        self.hidden.apply(&format!("{name}.hidden"), &grads.hidden, optimizer);
        self.output.apply(&format!("{name}.output"), &grads.output, optimizer);
    }

    pub fn num_parameters(&self) -> usize {
        self.hidden.num_parameters() + self.output.num_parameters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_mlp_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(42);
        let mlp = Mlp::new(6, 4, 2, Activation::Relu, &mut rng);
        let input = Array2::from_shape_fn((3, 6), |(i, j)| (i + j) as f32 * 0.1);

        let (output, cache) = mlp.forward(&input);
        assert_eq!(output.dim(), (3, 2));
        assert_eq!(mlp.infer(&input), output);

        let (grad_in, grads) = mlp.backward(&cache, &Array2::ones((3, 2)));
        assert_eq!(grad_in.dim(), (3, 6));
        assert_eq!(grads.hidden.weight.dim(), (6, 4));
        assert_eq!(grads.output.weight.dim(), (4, 2));
    }

    #[test]
    fn test_mlp_learns_linear_target() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mlp = Mlp::new(2, 8, 1, Activation::Tanh, &mut rng);
        let mut optimizer = AdamOptimizer::new(0.01, 0.0);

        let input = Array2::from_shape_fn((16, 2), |(i, j)| ((i * 3 + j * 5) % 7) as f32 / 7.0);
        let target = input.column(0).to_owned() - input.column(1).to_owned();

        let loss_of = |mlp: &Mlp| {
            let out = mlp.infer(&input);
            out.column(0)
                .iter()
                .zip(target.iter())
                .map(|(p, t)| (p - t).powi(2))
                .sum::<f32>()
                / 16.0
        };

        let initial = loss_of(&mlp);
        for _ in 0..300 {
            let (out, cache) = mlp.forward(&input);
            let mut grad = out.clone();
            for i in 0..16 {
                grad[[i, 0]] = 2.0 * (out[[i, 0]] - target[i]) / 16.0;
            }
            let (_, grads) = mlp.backward(&cache, &grad);
            mlp.apply("mlp", &grads, &mut optimizer);
        }

        assert!(loss_of(&mlp) < initial);
    }
}
