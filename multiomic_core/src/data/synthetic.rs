//! Synthetic multi-omic cohorts for validation experiments.
//!
//! Two latent factors per sample drive every omics feature (plus noise) and
//! every clinical variable, so supervised encoders have real signal to find.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::data::annotation::{Annotation, AnnotationValue};
use crate::data::layer_store::FeatureMatrix;
use crate::error::OmicsResult;

/// Numerical target: `2·z0 + z1 + noise`
pub const RESPONSE_VARIABLE: &str = "response";
/// Categorical target with classes A, B, C
pub const SUBTYPE_VARIABLE: &str = "subtype";
/// Batch-like nuisance variable with two integer levels
pub const CENTER_VARIABLE: &str = "center";
pub const EVENT_VARIABLE: &str = "os_status";
pub const TIME_VARIABLE: &str = "os_time";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub num_features: usize,
}

/// Configuration for cohort generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortConfig {
    pub num_samples: usize,
    pub layers: Vec<LayerSpec>,
    /// Standard deviation of per-feature Gaussian noise
    pub noise_level: f32,
    /// Fraction of omics cells and clinical labels set to missing
    pub missing_rate: f32,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            num_samples: 60,
            layers: vec![
                LayerSpec {
                    name: "gex".into(),
                    num_features: 40,
                },
                LayerSpec {
                    name: "cnv".into(),
                    num_features: 30,
                },
            ],
            noise_level: 0.3,
            missing_rate: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct ClinicalRecord {
    response: f64,
    subtype: Option<&'static str>,
    center: f64,
    event: f64,
    time: f64,
}

/// Generated omics layers plus matching clinical annotation.
#[derive(Debug, Clone)]
pub struct SyntheticCohort {
    samples: Vec<String>,
    layers: Vec<FeatureMatrix>,
    clinical: Vec<ClinicalRecord>,
}

impl SyntheticCohort {
    pub fn generate(config: &CohortConfig) -> OmicsResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = config.num_samples;
        let samples: Vec<String> = (0..n).map(|i| format!("sample_{i:03}")).collect();

        let factors = Array2::from_shape_fn((n, 2), |_| rng.sample::<f32, _>(StandardNormal));

        let layers = config
            .layers
            .iter()
            .map(|spec| {
                let loadings =
                    Array2::from_shape_fn((2, spec.num_features), |_| rng.sample::<f32, _>(StandardNormal));
                let mut values = factors.dot(&loadings);
                values.mapv_inplace(|v| {
                    let noise: f32 = rng.sample(StandardNormal);
                    if rng.gen::<f32>() < config.missing_rate {
                        f32::NAN
                    } else {
                        v + noise * config.noise_level
                    }
                });
                let features = (0..spec.num_features)
                    .map(|j| format!("{}_{j}", spec.name))
                    .collect();
                FeatureMatrix::new(spec.name.clone(), samples.clone(), features, values)
            })
            .collect::<OmicsResult<Vec<_>>>()?;

        let clinical = factors
            .axis_iter(Axis(0))
            .map(|z| {
                let (z0, z1) = (z[0] as f64, z[1] as f64);
                let noise: f64 = rng.sample(StandardNormal);
                let hazard = (0.8 * z0).exp();
                let time = -(rng.gen::<f64>().max(1e-6)).ln() / hazard * 10.0;
                let subtype = if z0 > 0.5 {
                    "A"
                } else if z1 > 0.0 {
                    "B"
                } else {
                    "C"
                };
                let labelled = rng.gen::<f32>() >= config.missing_rate;

                ClinicalRecord {
                    response: 2.0 * z0 + z1 + 0.1 * noise,
                    subtype: labelled.then_some(subtype),
                    center: if rng.gen::<bool>() { 1.0 } else { 0.0 },
                    event: if rng.gen::<f64>() < 0.7 { 1.0 } else { 0.0 },
                    time: (time * 100.0).round() / 100.0,
                }
            })
            .collect();

        Ok(Self {
            samples,
            layers,
            clinical,
        })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn layers(&self) -> &[FeatureMatrix] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn annotation(&self) -> Annotation {
        let mut annotation = Annotation::new();
        for (sample, record) in self.samples.iter().zip(&self.clinical) {
            annotation.insert(sample.as_str(), RESPONSE_VARIABLE, record.response);
            annotation.insert(
                sample.as_str(),
                SUBTYPE_VARIABLE,
                record
                    .subtype
                    .map(AnnotationValue::from)
                    .unwrap_or(AnnotationValue::Missing),
            );
            annotation.insert(sample.as_str(), CENTER_VARIABLE, record.center);
            annotation.insert(sample.as_str(), EVENT_VARIABLE, record.event);
            annotation.insert(sample.as_str(), TIME_VARIABLE, record.time);
        }
        annotation
    }

    /// Split into (train, test) cohorts; the first `train_ratio` of samples
    /// go to train.
    pub fn split(&self, train_ratio: f32) -> OmicsResult<(SyntheticCohort, SyntheticCohort)> {
        let cut = ((self.len() as f32) * train_ratio).round() as usize;
        let cut = cut.min(self.len());
        let train: Vec<usize> = (0..cut).collect();
        let test: Vec<usize> = (cut..self.len()).collect();
        Ok((self.rows(&train)?, self.rows(&test)?))
    }

    fn rows(&self, rows: &[usize]) -> OmicsResult<SyntheticCohort> {
        let samples: Vec<String> = rows.iter().map(|&i| self.samples[i].clone()).collect();
        let layers = self
            .layers
            .iter()
            .map(|m| {
                FeatureMatrix::new(
                    m.name.clone(),
                    samples.clone(),
                    m.features.clone(),
                    m.values.select(Axis(0), rows),
                )
            })
            .collect::<OmicsResult<Vec<_>>>()?;
        let clinical = rows.iter().map(|&i| self.clinical[i].clone()).collect();

        Ok(SyntheticCohort {
            samples,
            layers,
            clinical,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_shapes() {
        let cohort = SyntheticCohort::generate(&CohortConfig::default()).unwrap();
        assert_eq!(cohort.len(), 60);
        assert_eq!(cohort.layers()[0].values.dim(), (60, 40));
        assert_eq!(cohort.layers()[1].values.dim(), (60, 30));
        assert_eq!(cohort.annotation().len(), 60);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = SyntheticCohort::generate(&CohortConfig::default()).unwrap();
        let b = SyntheticCohort::generate(&CohortConfig::default()).unwrap();
        assert_eq!(a.layers()[0].values, b.layers()[0].values);
    }

    #[test]
    fn test_split_partitions_samples() {
        let cohort = SyntheticCohort::generate(&CohortConfig::default()).unwrap();
        let (train, test) = cohort.split(0.75).unwrap();
        assert_eq!(train.len(), 45);
        assert_eq!(test.len(), 15);
        assert_eq!(test.samples()[0], "sample_045");
    }

    #[test]
    fn test_missing_rate_introduces_nan() {
        let config = CohortConfig {
            missing_rate: 0.2,
            ..Default::default()
        };
        let cohort = SyntheticCohort::generate(&config).unwrap();
        assert!(cohort.layers()[0].values.iter().any(|v| v.is_nan()));
    }
}
