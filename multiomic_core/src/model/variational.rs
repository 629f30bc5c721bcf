//! Supervised variational encoder.
//!
//! Per-layer blocks feed shared `mu` and `log_var` projections. Training
//! samples `z = mu + eps · exp(log_var / 2)`; evaluation uses `z = mu`. The
//! auxiliary objective is `kl_weight · KL(q(z|x) ‖ N(0, I))` plus the MSE of
//! per-layer decoders reconstructing each input from `z`.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::data::dataset::Batch;
use crate::error::OmicsResult;
use crate::model::encoder::{
    activation_param, base_schema, check_inputs, concat_columns, hidden_width, split_columns, AuxiliaryLoss,
    Encoder, Mode,
};
use crate::neural::{AdamOptimizer, Dense, DenseGrads, Mlp, MlpCache, MlpGrads};
use crate::tuning::space::{EncoderKind, HyperParams, ParamKind, ParamRequirement};

const LOG_VAR_LIMIT: f32 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationalEncoder {
    blocks: Vec<Mlp>,
    mu: Dense,
    log_var: Dense,
    decoders: Vec<Mlp>,
    latent_dim: usize,
    kl_weight: f32,
}

pub struct VariationalTrace {
    block_caches: Vec<MlpCache>,
    hidden: Array2<f32>,
    mu: Array2<f32>,
    log_var: Array2<f32>,
    /// Reparameterization noise; `None` in evaluation mode
    noise: Option<Array2<f32>>,
    /// Decoder caches and reconstructions; training mode only
    decoded: Vec<(MlpCache, Array2<f32>)>,
    inputs: Vec<Array2<f32>>,
}

pub struct VariationalGrads {
    blocks: Vec<MlpGrads>,
    mu: DenseGrads,
    log_var: DenseGrads,
    decoders: Option<Vec<MlpGrads>>,
}

impl VariationalEncoder {
    pub fn kl_weight(&self) -> f32 {
        self.kl_weight
    }

    fn kl_divergence(mu: &Array2<f32>, log_var: &Array2<f32>) -> f32 {
        let n = mu.nrows().max(1) as f32;
        let total: f32 = mu
            .iter()
            .zip(log_var.iter())
            .map(|(&m, &lv)| 1.0 + lv - m * m - lv.exp())
            .sum();
        -0.5 * total / n
    }

    fn reconstruction_loss(trace: &VariationalTrace) -> f32 {
        trace
            .decoded
            .iter()
            .zip(&trace.inputs)
            .map(|((_, recon), input)| {
                let diff = recon - input;
                diff.mapv(|d| d * d).mean().unwrap_or(0.0)
            })
            .sum()
    }
}

impl Encoder for VariationalEncoder {
    type Trace = VariationalTrace;
    type Grads = VariationalGrads;

    const KIND: EncoderKind = EncoderKind::Variational;

    fn schema() -> Vec<ParamRequirement> {
        let mut schema = base_schema();
        schema.push(ParamRequirement::new("kl_weight", ParamKind::PositiveReal));
        schema
    }

    fn build(input_dims: &[usize], params: &HyperParams, rng: &mut StdRng) -> OmicsResult<Self> {
        let latent_dim = params.usize("latent_dim")?;
        let factor = params.f32("hidden_dim_factor")?;
        let activation = activation_param(params)?;

        let blocks: Vec<Mlp> = input_dims
            .iter()
            .map(|&dim| Mlp::new(dim, hidden_width(dim, factor), latent_dim, activation, rng))
            .collect();
        let joint = latent_dim * blocks.len();
        let mu = Dense::new(joint, latent_dim, rng);
        let log_var = Dense::new(joint, latent_dim, rng);
        let decoders = input_dims
            .iter()
            .map(|&dim| Mlp::new(latent_dim, hidden_width(dim, factor), dim, activation, rng))
            .collect();

        Ok(Self {
            blocks,
            mu,
            log_var,
            decoders,
            latent_dim,
            kl_weight: params.f32("kl_weight")?,
        })
    }

    fn input_dims(&self) -> Vec<usize> {
        self.blocks.iter().map(Mlp::input_dim).collect()
    }

    fn embedding_dim(&self) -> usize {
        self.latent_dim
    }

    fn encode(&self, batch: &Batch, mode: Mode, rng: &mut StdRng) -> OmicsResult<(Array2<f32>, Self::Trace)> {
        check_inputs(batch, &self.input_dims())?;

        let (outputs, block_caches): (Vec<_>, Vec<_>) = self
            .blocks
            .iter()
            .zip(&batch.inputs)
            .map(|(block, input)| block.forward(input))
            .unzip();
        let hidden = concat_columns(&outputs)?;
        let mu = self.mu.forward(&hidden);
        let log_var = self
            .log_var
            .forward(&hidden)
            .mapv(|v| v.clamp(-LOG_VAR_LIMIT, LOG_VAR_LIMIT));

        let (z, noise) = match mode {
            Mode::Eval => (mu.clone(), None),
            Mode::Train => {
                let noise = Array2::from_shape_fn(mu.dim(), |_| rng.sample::<f32, _>(StandardNormal));
                let z = &mu + &(&noise * &log_var.mapv(|lv| (0.5 * lv).exp()));
                (z, Some(noise))
            }
        };

        let decoded = match mode {
            Mode::Eval => Vec::new(),
            Mode::Train => self
                .decoders
                .iter()
                .map(|decoder| {
                    let (recon, cache) = decoder.forward(&z);
                    (cache, recon)
                })
                .collect(),
        };

        let trace = VariationalTrace {
            block_caches,
            hidden,
            mu,
            log_var,
            noise,
            decoded,
            inputs: batch.inputs.clone(),
        };
        Ok((z, trace))
    }

    fn auxiliary_loss(
        &self,
        trace: &Self::Trace,
        _embedding: &Array2<f32>,
        _anchors: &[Option<usize>],
    ) -> AuxiliaryLoss {
        AuxiliaryLoss {
            value: self.kl_weight * Self::kl_divergence(&trace.mu, &trace.log_var)
                + Self::reconstruction_loss(trace),
            grad_embedding: None,
        }
    }

    fn backward(
        &self,
        trace: &Self::Trace,
        grad_embedding: &Array2<f32>,
        with_auxiliary: bool,
    ) -> (Self::Grads, Vec<Array2<f32>>) {
        let mut grad_z = grad_embedding.clone();
        let mut decoder_grads = None;

        if with_auxiliary && !trace.decoded.is_empty() {
            let grads = self
                .decoders
                .iter()
                .zip(&trace.decoded)
                .zip(&trace.inputs)
                .map(|((decoder, (cache, recon)), input)| {
                    let count = recon.len().max(1) as f32;
                    let grad_recon = (recon - input) * (2.0 / count);
                    let (grad_latent, grads) = decoder.backward(cache, &grad_recon);
                    grad_z += &grad_latent;
                    grads
                })
                .collect();
            decoder_grads = Some(grads);
        }

        let sigma = trace.log_var.mapv(|lv| (0.5 * lv).exp());
        let mut grad_mu = grad_z.clone();
        let mut grad_log_var = match &trace.noise {
            Some(noise) => &grad_z * noise * &sigma * 0.5,
            None => Array2::zeros(trace.log_var.dim()),
        };

        if with_auxiliary {
            let n = trace.mu.nrows().max(1) as f32;
            let scale = self.kl_weight / n;
            grad_mu = grad_mu + &trace.mu * scale;
            grad_log_var = grad_log_var + trace.log_var.mapv(|lv| 0.5 * (lv.exp() - 1.0) * scale);
        }

        let (grad_hidden_mu, mu_grads) = self.mu.backward(&trace.hidden, &grad_mu);
        let (grad_hidden_lv, log_var_grads) = self.log_var.backward(&trace.hidden, &grad_log_var);
        let grad_hidden = grad_hidden_mu + grad_hidden_lv;

        let widths = vec![self.latent_dim; self.blocks.len()];
        let (input_grads, block_grads): (Vec<_>, Vec<_>) = self
            .blocks
            .iter()
            .zip(&trace.block_caches)
            .zip(split_columns(&grad_hidden, &widths))
            .map(|((block, cache), grad)| block.backward(cache, &grad))
            .unzip();

        (
            VariationalGrads {
                blocks: block_grads,
                mu: mu_grads,
                log_var: log_var_grads,
                decoders: decoder_grads,
            },
            input_grads,
        )
    }

    fn apply(&mut self, grads: &Self::Grads, optimizer: &mut AdamOptimizer) {
        for (i, (block, grad)) in self.blocks.iter_mut().zip(&grads.blocks).enumerate() {
            block.apply(&format!("encoder.{i}"), grad, optimizer);
        }
        self.mu.apply("encoder.mu", &grads.mu, optimizer);
        self.log_var.apply("encoder.log_var", &grads.log_var, optimizer);
        if let Some(decoder_grads) = &grads.decoders {
            for (i, (decoder, grad)) in self.decoders.iter_mut().zip(decoder_grads).enumerate() {
                decoder.apply(&format!("decoder.{i}"), grad, optimizer);
            }
        }
    }

    fn num_parameters(&self) -> usize {
        self.blocks.iter().map(Mlp::num_parameters).sum::<usize>()
            + self.mu.num_parameters()
            + self.log_var.num_parameters()
            + self.decoders.iter().map(Mlp::num_parameters).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::space::ParamValue;
    use ndarray::array;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn params() -> HyperParams {
        HyperParams::new()
            .with("latent_dim", ParamValue::Integer(2))
            .with("hidden_dim_factor", ParamValue::Real(1.0))
            .with("kl_weight", ParamValue::Real(0.5))
    }

    fn batch() -> Batch {
        Batch {
            indices: vec![0, 1, 2],
            inputs: vec![array![[0.5f32, -1.0, 0.2], [1.0, 0.0, -0.3], [-0.7, 0.4, 0.9]]],
            labels: BTreeMap::new(),
            adjacency: None,
        }
    }

    #[test]
    fn test_eval_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(4);
        let encoder = VariationalEncoder::build(&[3], &params(), &mut rng).unwrap();
        let (a, _) = encoder.encode(&batch(), Mode::Eval, &mut rng).unwrap();
        let (b, _) = encoder.encode(&batch(), Mode::Eval, &mut rng).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), (3, 2));
    }

    #[test]
    fn test_training_adds_auxiliary_terms() {
        let mut rng = StdRng::seed_from_u64(4);
        let encoder = VariationalEncoder::build(&[3], &params(), &mut rng).unwrap();
        let (z, trace) = encoder.encode(&batch(), Mode::Train, &mut rng).unwrap();
        let aux = encoder.auxiliary_loss(&trace, &z, &[]);

        assert!(aux.value.is_finite());
        assert!(aux.value > 0.0);
        let (grads, input_grads) = encoder.backward(&trace, &Array2::zeros(z.dim()), true);
        assert!(grads.decoders.is_some());
        assert_eq!(input_grads[0].dim(), (3, 3));
    }

    #[test]
    fn test_kl_of_standard_normal_is_zero() {
        let mu = Array2::zeros((4, 3));
        let log_var = Array2::zeros((4, 3));
        assert!(VariationalEncoder::kl_divergence(&mu, &log_var).abs() < 1e-7);
    }

    #[test]
    fn test_kl_gradient_matches_finite_difference() {
        let mu = array![[0.3f32, -0.2]];
        let log_var = array![[0.1f32, -0.4]];
        let eps = 1e-3;
        // d KL / d mu = mu / n; d KL / d log_var = 0.5 (exp(lv) − 1) / n
        for k in 0..2 {
            let mut plus = mu.clone();
            plus[[0, k]] += eps;
            let mut minus = mu.clone();
            minus[[0, k]] -= eps;
            let numeric = (VariationalEncoder::kl_divergence(&plus, &log_var)
                - VariationalEncoder::kl_divergence(&minus, &log_var))
                / (2.0 * eps);
            assert!((numeric - mu[[0, k]]).abs() < 1e-3);

            let mut plus = log_var.clone();
            plus[[0, k]] += eps;
            let mut minus = log_var.clone();
            minus[[0, k]] -= eps;
            let numeric = (VariationalEncoder::kl_divergence(&mu, &plus)
                - VariationalEncoder::kl_divergence(&mu, &minus))
                / (2.0 * eps);
            let analytic = 0.5 * (log_var[[0, k]].exp() - 1.0);
            assert!((numeric - analytic).abs() < 1e-3);
        }
    }
}
