//! Per-layer feature matrices, sample alignment and feature selection.
//!
//! The training side selects features by variance and records per-feature
//! statistics. A held-out side is aligned with [`LayerStore::align_to`],
//! which reuses the training feature names and statistics verbatim.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::data::annotation::Annotation;
use crate::error::{OmicsError, OmicsResult};

/// Raw sample-indexed matrix for one omics layer. Missing values are NaN.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub name: String,
    pub samples: Vec<String>,
    pub features: Vec<String>,
    /// [samples, features]
    pub values: Array2<f32>,
}

impl FeatureMatrix {
    pub fn new(
        name: impl Into<String>,
        samples: Vec<String>,
        features: Vec<String>,
        values: Array2<f32>,
    ) -> OmicsResult<Self> {
        let name = name.into();
        if values.nrows() != samples.len() {
            return Err(OmicsError::dimension_mismatch(
                samples.len(),
                values.nrows(),
                format!("rows of layer '{name}'"),
            ));
        }
        if values.ncols() != features.len() {
            return Err(OmicsError::dimension_mismatch(
                features.len(),
                values.ncols(),
                format!("columns of layer '{name}'"),
            ));
        }
        if samples.iter().collect::<HashSet<_>>().len() != samples.len() {
            return Err(OmicsError::configuration(
                format!("layer '{name}'"),
                "duplicate sample identifiers",
            ));
        }
        if features.iter().collect::<HashSet<_>>().len() != features.len() {
            return Err(OmicsError::configuration(
                format!("layer '{name}'"),
                "duplicate feature names",
            ));
        }

        Ok(Self {
            name,
            samples,
            features,
            values,
        })
    }

    fn row_index(&self) -> HashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect()
    }
}

/// Training-side statistics used to standardize a retained feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

/// One aligned, filtered and standardized layer.
#[derive(Debug, Clone)]
pub struct LayerData {
    pub name: String,
    pub features: Vec<String>,
    /// [samples, retained features]
    pub values: Array2<f32>,
    pub stats: FeatureStats,
}

#[derive(Debug, Clone)]
pub struct LayerStore {
    samples: Vec<String>,
    layers: Vec<LayerData>,
}

impl LayerStore {
    /// Align layers to the common sample set and select features by variance.
    pub fn select(
        raw: &[FeatureMatrix],
        annotation: &Annotation,
        config: &SelectionConfig,
    ) -> OmicsResult<Self> {
        let samples = common_samples(raw, annotation)?;

        let layers = raw
            .iter()
            .map(|matrix| {
                let aligned = aligned_rows(matrix, &samples);
                let variances = column_variances(&aligned);
                let keep = select_by_variance(&variances, config.min_features, config.top_percentile);
                if keep.is_empty() {
                    return Err(OmicsError::configuration(
                        format!("layer '{}'", matrix.name),
                        "no features left after selection",
                    ));
                }

                let selected = aligned.select(ndarray::Axis(1), &keep);
                let stats = column_stats(&selected);
                let values = standardize(&selected, &stats);
                let features = keep.iter().map(|&j| matrix.features[j].clone()).collect();

                tracing::debug!(
                    layer = %matrix.name,
                    retained = keep.len(),
                    available = matrix.features.len(),
                    "feature selection"
                );

                Ok(LayerData {
                    name: matrix.name.clone(),
                    features,
                    values,
                    stats,
                })
            })
            .collect::<OmicsResult<Vec<_>>>()?;

        Ok(Self { samples, layers })
    }

    /// Align a held-out set to a training store.
    ///
    /// Reuses the reference's retained feature names and statistics; no
    /// selection happens on held-out data.
    pub fn align_to(
        raw: &[FeatureMatrix],
        annotation: &Annotation,
        reference: &LayerStore,
    ) -> OmicsResult<Self> {
        let relevant: Vec<FeatureMatrix> = reference
            .layers
            .iter()
            .map(|layer| {
                raw.iter()
                    .find(|m| m.name == layer.name)
                    .cloned()
                    .ok_or_else(|| {
                        OmicsError::configuration(
                            format!("layer '{}'", layer.name),
                            "missing from held-out data",
                        )
                    })
            })
            .collect::<OmicsResult<_>>()?;

        let samples = common_samples(&relevant, annotation)?;

        let layers = reference
            .layers
            .iter()
            .zip(&relevant)
            .map(|(reference_layer, matrix)| {
                let column_of: HashMap<&str, usize> = matrix
                    .features
                    .iter()
                    .enumerate()
                    .map(|(j, f)| (f.as_str(), j))
                    .collect();
                let keep = reference_layer
                    .features
                    .iter()
                    .map(|feature| {
                        column_of.get(feature.as_str()).copied().ok_or_else(|| {
                            OmicsError::configuration(
                                format!("layer '{}'", matrix.name),
                                format!("held-out data lacks retained feature '{feature}'"),
                            )
                        })
                    })
                    .collect::<OmicsResult<Vec<_>>>()?;

                let aligned = aligned_rows(matrix, &samples);
                let selected = aligned.select(ndarray::Axis(1), &keep);
                let values = standardize(&selected, &reference_layer.stats);

                Ok(LayerData {
                    name: reference_layer.name.clone(),
                    features: reference_layer.features.clone(),
                    values,
                    stats: reference_layer.stats.clone(),
                })
            })
            .collect::<OmicsResult<Vec<_>>>()?;

        Ok(Self { samples, layers })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn layers(&self) -> &[LayerData] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&LayerData> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Retained feature names per layer.
    pub fn selected_features(&self) -> BTreeMap<String, Vec<String>> {
        self.layers
            .iter()
            .map(|l| (l.name.clone(), l.features.clone()))
            .collect()
    }
}

/// Sorted intersection of the sample ids of every layer and the annotation.
fn common_samples(raw: &[FeatureMatrix], annotation: &Annotation) -> OmicsResult<Vec<String>> {
    if raw.is_empty() {
        return Err(OmicsError::configuration("layers", "no omics layers supplied"));
    }

    let mut common: BTreeSet<&String> = annotation.samples().collect();
    for matrix in raw {
        let present: HashSet<&String> = matrix.samples.iter().collect();
        common.retain(|s| present.contains(s));
    }

    if common.is_empty() {
        return Err(OmicsError::alignment(format!(
            "no samples shared by annotation and layers [{}]",
            raw.iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok(common.into_iter().cloned().collect())
}

fn aligned_rows(matrix: &FeatureMatrix, samples: &[String]) -> Array2<f32> {
    let index = matrix.row_index();
    let rows: Vec<usize> = samples.iter().map(|s| index[s.as_str()]).collect();
    matrix.values.select(ndarray::Axis(0), &rows)
}

/// Variance of each column over non-missing values; `None` if all missing.
fn column_variances(values: &Array2<f32>) -> Vec<Option<f64>> {
    (0..values.ncols())
        .into_par_iter()
        .map(|j| {
            let present: Vec<f64> = values
                .column(j)
                .iter()
                .filter(|v| !v.is_nan())
                .map(|&v| v as f64)
                .collect();
            if present.is_empty() {
                return None;
            }
            let n = present.len() as f64;
            let mean = present.iter().sum::<f64>() / n;
            Some(present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n)
        })
        .collect()
}

/// Indices of retained columns, in input column order.
///
/// Keeps `max(min_features, ceil(n · top_percentile / 100))` columns with the
/// highest variance, capped at the number of columns with a defined variance.
/// Ties keep input order.
pub(crate) fn select_by_variance(
    variances: &[Option<f64>],
    min_features: usize,
    top_percentile: f32,
) -> Vec<usize> {
    let mut ranked: Vec<(usize, f64)> = variances
        .iter()
        .enumerate()
        .filter_map(|(j, v)| v.map(|v| (j, v)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let available = ranked.len();
    let by_percentile = ((available as f64) * (top_percentile as f64) / 100.0).ceil() as usize;
    let keep_count = min_features.max(by_percentile).min(available);

    let mut keep: Vec<usize> = ranked.into_iter().take(keep_count).map(|(j, _)| j).collect();
    keep.sort_unstable();
    keep
}

fn column_stats(values: &Array2<f32>) -> FeatureStats {
    let (mean, std): (Vec<f32>, Vec<f32>) = values
        .columns()
        .into_iter()
        .map(|column| {
            let present: Vec<f32> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if present.is_empty() {
                return (0.0, 1.0);
            }
            let n = present.len() as f32;
            let mean = present.iter().sum::<f32>() / n;
            let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
            let std = var.sqrt();
            (mean, if std > 1e-8 { std } else { 1.0 })
        })
        .unzip();

    FeatureStats { mean, std }
}

/// Z-score with the given statistics; missing values become the mean (0).
fn standardize(values: &Array2<f32>, stats: &FeatureStats) -> Array2<f32> {
    let mut out = values.clone();
    for (j, mut column) in out.columns_mut().into_iter().enumerate() {
        let (mean, std) = (stats.mean[j], stats.std[j]);
        column.mapv_inplace(|v| if v.is_nan() { 0.0 } else { (v - mean) / std });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn annotation_for(samples: &[&str]) -> Annotation {
        let mut ann = Annotation::new();
        for s in samples {
            ann.insert(*s, "y", 1.0);
        }
        ann
    }

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_select_by_variance_keeps_larger_rule() {
        let variances = vec![Some(1.0), Some(5.0), Some(3.0), Some(0.5), None];
        // 4 valid columns; 50% → 2, min 1 → keep 2 highest: cols 1, 2
        assert_eq!(select_by_variance(&variances, 1, 50.0), vec![1, 2]);
        // min 3 wins over 25% (=1)
        assert_eq!(select_by_variance(&variances, 3, 25.0), vec![0, 1, 2]);
        // capped at available
        assert_eq!(select_by_variance(&variances, 10, 100.0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_alignment_intersects_and_sorts() {
        let a = FeatureMatrix::new(
            "gex",
            vec!["s3".into(), "s1".into(), "s2".into()],
            names("g", 2),
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]],
        )
        .unwrap();
        let b = FeatureMatrix::new(
            "cnv",
            vec!["s2".into(), "s3".into(), "s9".into()],
            names("c", 1),
            array![[1.0], [2.0], [3.0]],
        )
        .unwrap();
        let ann = annotation_for(&["s1", "s2", "s3"]);

        let config = SelectionConfig {
            min_features: 5,
            top_percentile: 100.0,
        };
        let store = LayerStore::select(&[a, b], &ann, &config).unwrap();
        assert_eq!(store.samples(), &["s2".to_string(), "s3".to_string()]);
        assert_eq!(store.layer("gex").unwrap().values.nrows(), 2);
        assert_eq!(store.layer("cnv").unwrap().values.nrows(), 2);
    }

    #[test]
    fn test_no_common_samples_is_alignment_error() {
        let a = FeatureMatrix::new("gex", vec!["s1".into()], names("g", 1), array![[1.0]]).unwrap();
        let ann = annotation_for(&["s2"]);
        let err = LayerStore::select(&[a], &ann, &SelectionConfig::default()).unwrap_err();
        assert!(matches!(err, OmicsError::Alignment { .. }));
    }

    #[test]
    fn test_all_missing_layer_is_configuration_error() {
        let a = FeatureMatrix::new(
            "gex",
            vec!["s1".into(), "s2".into()],
            names("g", 2),
            Array2::from_elem((2, 2), f32::NAN),
        )
        .unwrap();
        let ann = annotation_for(&["s1", "s2"]);
        let err = LayerStore::select(&[a], &ann, &SelectionConfig::default()).unwrap_err();
        assert!(matches!(err, OmicsError::Configuration { .. }));
    }

    #[test]
    fn test_holdout_reuses_training_features() {
        let train = FeatureMatrix::new(
            "gex",
            vec!["a".into(), "b".into(), "c".into()],
            names("g", 4),
            array![
                [0.0, 1.0, 0.0, 10.0],
                [0.0, 2.0, 0.1, 20.0],
                [0.0, 3.0, 0.0, 30.0]
            ],
        )
        .unwrap();
        let config = SelectionConfig {
            min_features: 1,
            top_percentile: 50.0,
        };
        let train_store = LayerStore::select(&[train], &annotation_for(&["a", "b", "c"]), &config).unwrap();
        assert_eq!(
            train_store.layer("gex").unwrap().features,
            vec!["g1".to_string(), "g3".to_string()]
        );

        // Held-out variances would pick different columns; they must not be used.
        let test = FeatureMatrix::new(
            "gex",
            vec!["d".into(), "e".into()],
            vec!["g3".into(), "g0".into(), "g2".into(), "g1".into()],
            array![[1.0, 100.0, -50.0, 2.0], [1.0, -100.0, 50.0, 2.0]],
        )
        .unwrap();
        let test_store =
            LayerStore::align_to(&[test], &annotation_for(&["d", "e"]), &train_store).unwrap();

        assert_eq!(
            test_store.selected_features(),
            train_store.selected_features()
        );
        let layer = test_store.layer("gex").unwrap();
        // g1 standardized with training mean 2
        assert!(layer.values[[0, 0]].abs() < 1e-6);
    }

    #[test]
    fn test_holdout_missing_feature_is_configuration_error() {
        let train = FeatureMatrix::new(
            "gex",
            vec!["a".into(), "b".into()],
            names("g", 1),
            array![[1.0], [2.0]],
        )
        .unwrap();
        let store = LayerStore::select(
            &[train],
            &annotation_for(&["a", "b"]),
            &SelectionConfig::default(),
        )
        .unwrap();
        let test = FeatureMatrix::new("gex", vec!["c".into()], vec!["other".into()], array![[1.0]]).unwrap();
        let err = LayerStore::align_to(&[test], &annotation_for(&["c"]), &store).unwrap_err();
        assert!(matches!(err, OmicsError::Configuration { .. }));
    }

    #[test]
    fn test_standardize_imputes_missing_with_mean() {
        let values = array![[1.0, f32::NAN], [3.0, 4.0]];
        let stats = column_stats(&values);
        let out = standardize(&values, &stats);
        assert!((out[[0, 0]] + 1.0).abs() < 1e-6);
        assert_eq!(out[[0, 1]], 0.0);
    }
}
