//! Model-ready multi-omic datasets.
//!
//! [`DatasetBuilder`] turns an aligned [`LayerStore`] plus the annotation
//! table into a [`MultiOmicDataset`]: fused or per-layer input matrices, one
//! encoded label vector per variable, and the variable types that decide
//! which supervisory head and loss each variable gets.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::annotation::{Annotation, AnnotationValue};
use crate::data::graph::SampleGraph;
use crate::data::layer_store::LayerStore;
use crate::data::variable::{infer_variable_type, LabelEncoding, VariableType};
use crate::error::{OmicsError, OmicsResult};

/// Name of the single input layer produced by early fusion.
pub const FUSED_LAYER: &str = "fused";

/// How omics layers reach the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// All layers concatenated column-wise into one matrix
    Early,
    /// One matrix per layer, encoded separately
    Intermediate,
}

impl Default for FusionMode {
    fn default() -> Self {
        FusionMode::Intermediate
    }
}

impl FromStr for FusionMode {
    type Err = OmicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "early" => Ok(FusionMode::Early),
            "intermediate" => Ok(FusionMode::Intermediate),
            other => Err(OmicsError::configuration(
                "fusion",
                format!("unknown fusion mode '{other}' (expected 'early' or 'intermediate')"),
            )),
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionMode::Early => f.write_str("early"),
            FusionMode::Intermediate => f.write_str("intermediate"),
        }
    }
}

/// A feature column together with the omics layer it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureId {
    pub layer: String,
    pub name: String,
}

/// One encoder input matrix.
#[derive(Debug, Clone)]
pub struct OmicLayer {
    pub name: String,
    pub features: Vec<FeatureId>,
    /// [samples, features]
    pub values: Array2<f32>,
}

/// Event indicator and time-to-event variable of one survival endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivalPair {
    pub event: String,
    pub time: String,
}

/// Rows of a dataset gathered for one forward pass.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Row indices into the originating dataset
    pub indices: Vec<usize>,
    pub inputs: Vec<Array2<f32>>,
    pub labels: BTreeMap<String, Array1<f32>>,
    /// Normalized sample adjacency, present when the dataset carries a graph
    pub adjacency: Option<Array2<f32>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn label(&self, variable: &str) -> OmicsResult<ArrayView1<'_, f32>> {
        self.labels
            .get(variable)
            .map(Array1::view)
            .ok_or_else(|| OmicsError::configuration("batch", format!("no labels for '{variable}'")))
    }

    /// Same rows, labels and graph with different input matrices.
    pub fn with_inputs(&self, inputs: Vec<Array2<f32>>) -> Batch {
        Batch {
            indices: self.indices.clone(),
            inputs,
            labels: self.labels.clone(),
            adjacency: self.adjacency.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiOmicDataset {
    samples: Vec<String>,
    layers: Vec<OmicLayer>,
    labels: BTreeMap<String, Array1<f32>>,
    variable_types: BTreeMap<String, VariableType>,
    label_mappings: BTreeMap<String, LabelEncoding>,
    target_variables: Vec<String>,
    batch_variables: Vec<String>,
    survival: Option<SurvivalPair>,
    fusion: FusionMode,
    graph_neighbors: Option<usize>,
    graph: Option<SampleGraph>,
}

impl MultiOmicDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn layers(&self) -> &[OmicLayer] {
        &self.layers
    }

    pub fn input_dims(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.values.ncols()).collect()
    }

    pub fn fusion(&self) -> FusionMode {
        self.fusion
    }

    pub fn graph(&self) -> Option<&SampleGraph> {
        self.graph.as_ref()
    }

    pub fn target_variables(&self) -> &[String] {
        &self.target_variables
    }

    pub fn batch_variables(&self) -> &[String] {
        &self.batch_variables
    }

    pub fn survival(&self) -> Option<&SurvivalPair> {
        self.survival.as_ref()
    }

    pub fn variable_types(&self) -> &BTreeMap<String, VariableType> {
        &self.variable_types
    }

    pub fn variable_type(&self, variable: &str) -> Option<VariableType> {
        self.variable_types.get(variable).copied()
    }

    pub fn label_encoding(&self, variable: &str) -> Option<&LabelEncoding> {
        self.label_mappings.get(variable)
    }

    /// Class labels per categorical variable, indexed by class.
    pub fn label_mappings(&self) -> BTreeMap<String, Vec<String>> {
        self.label_mappings
            .iter()
            .map(|(k, v)| (k.clone(), v.labels().to_vec()))
            .collect()
    }

    pub fn labels(&self, variable: &str) -> Option<ArrayView1<'_, f32>> {
        self.labels.get(variable).map(Array1::view)
    }

    /// Variables that get a supervisory head: targets, the survival event,
    /// then batch variables. No duplicates.
    pub fn head_variables(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.target_variables
            .iter()
            .chain(self.survival.iter().map(|s| &s.event))
            .chain(self.batch_variables.iter())
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }

    /// Input matrices concatenated column-wise.
    pub fn concatenated_inputs(&self) -> OmicsResult<Array2<f32>> {
        concatenate_columns(self.layers.iter().map(|l| l.values.view()))
    }

    /// Per-layer column means, used as an attribution baseline.
    pub fn column_means(&self) -> Vec<Array1<f32>> {
        self.layers
            .iter()
            .map(|l| {
                l.values
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(l.values.ncols()))
            })
            .collect()
    }

    pub fn batch(&self, indices: &[usize]) -> Batch {
        Batch {
            indices: indices.to_vec(),
            inputs: self
                .layers
                .iter()
                .map(|l| l.values.select(Axis(0), indices))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.select(Axis(0), indices)))
                .collect(),
            adjacency: self.graph.as_ref().map(|g| g.normalized_adjacency(indices)),
        }
    }

    pub fn full_batch(&self) -> Batch {
        let indices: Vec<usize> = (0..self.len()).collect();
        self.batch(&indices)
    }

    /// New dataset holding the given rows, in the given order.
    pub fn subset(&self, indices: &[usize]) -> MultiOmicDataset {
        MultiOmicDataset {
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
            layers: self
                .layers
                .iter()
                .map(|l| OmicLayer {
                    name: l.name.clone(),
                    features: l.features.clone(),
                    values: l.values.select(Axis(0), indices),
                })
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.select(Axis(0), indices)))
                .collect(),
            variable_types: self.variable_types.clone(),
            label_mappings: self.label_mappings.clone(),
            target_variables: self.target_variables.clone(),
            batch_variables: self.batch_variables.clone(),
            survival: self.survival.clone(),
            fusion: self.fusion,
            graph_neighbors: self.graph_neighbors,
            graph: self.graph.as_ref().map(|g| g.restrict(indices)),
        }
    }
}

/// Assembles a [`MultiOmicDataset`] from a [`LayerStore`] and an annotation.
pub struct DatasetBuilder<'a> {
    store: &'a LayerStore,
    annotation: &'a Annotation,
    targets: Vec<String>,
    batch_variables: Vec<String>,
    fusion: FusionMode,
    survival: Option<SurvivalPair>,
    graph_neighbors: Option<usize>,
    categorical_max_levels: usize,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(store: &'a LayerStore, annotation: &'a Annotation) -> Self {
        Self {
            store,
            annotation,
            targets: Vec::new(),
            batch_variables: Vec::new(),
            fusion: FusionMode::default(),
            survival: None,
            graph_neighbors: None,
            categorical_max_levels: 2,
        }
    }

    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn batch_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch_variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn fusion(mut self, fusion: FusionMode) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_survival(mut self, event: impl Into<String>, time: impl Into<String>) -> Self {
        self.survival = Some(SurvivalPair {
            event: event.into(),
            time: time.into(),
        });
        self
    }

    pub fn with_sample_graph(mut self, neighbors: usize) -> Self {
        self.graph_neighbors = Some(neighbors);
        self
    }

    /// Integer columns with at most this many levels are treated as categorical.
    pub fn categorical_max_levels(mut self, levels: usize) -> Self {
        self.categorical_max_levels = levels;
        self
    }

    pub fn build(self) -> OmicsResult<MultiOmicDataset> {
        if self.targets.is_empty() && self.survival.is_none() {
            return Err(OmicsError::configuration(
                "dataset",
                "at least one target variable or a survival pair is required",
            ));
        }

        let samples = self.store.samples().to_vec();
        for variable in self.all_variables() {
            if !self.annotation.has_variable(&variable) {
                return Err(OmicsError::configuration(
                    "dataset",
                    format!("variable '{variable}' not found in annotation"),
                ));
            }
        }

        let mut variable_types = BTreeMap::new();
        let mut label_mappings = BTreeMap::new();
        for variable in self.targets.iter().chain(&self.batch_variables) {
            let column = self.annotation.column(variable, &samples);
            let kind = infer_variable_type(&column, self.categorical_max_levels);
            if kind == VariableType::Categorical {
                let encoding = LabelEncoding::fit(&column);
                if encoding.num_classes() == 0 {
                    return Err(OmicsError::configuration(
                        "dataset",
                        format!("categorical variable '{variable}' has no observed classes"),
                    ));
                }
                label_mappings.insert(variable.clone(), encoding);
            }
            variable_types.insert(variable.clone(), kind);
        }
        if let Some(pair) = &self.survival {
            label_mappings.remove(&pair.event);
            label_mappings.remove(&pair.time);
            variable_types.insert(pair.event.clone(), VariableType::SurvivalEvent);
            variable_types.insert(pair.time.clone(), VariableType::Numerical);
        }

        let labels = encode_labels(self.annotation, &samples, &variable_types, &label_mappings)?;
        let layers = assemble_layers(self.store, self.fusion)?;
        let graph = self.sample_graph(&layers)?;

        tracing::info!(
            samples = samples.len(),
            layers = layers.len(),
            fusion = %self.fusion,
            variables = variable_types.len(),
            "dataset built"
        );

        Ok(MultiOmicDataset {
            samples,
            layers,
            labels,
            variable_types,
            label_mappings,
            target_variables: self.targets,
            batch_variables: self.batch_variables,
            survival: self.survival,
            fusion: self.fusion,
            graph_neighbors: self.graph_neighbors,
            graph,
        })
    }

    /// Build a held-out dataset with the variables, types, label mappings,
    /// fusion and graph settings of `reference`.
    ///
    /// The store must have been aligned to the training store. Classes never
    /// seen in training and variables absent from the held-out annotation
    /// read as missing.
    pub fn build_holdout(self, reference: &MultiOmicDataset) -> OmicsResult<MultiOmicDataset> {
        let layers = assemble_layers(self.store, reference.fusion)?;
        if layers.len() != reference.layers.len()
            || layers
                .iter()
                .zip(&reference.layers)
                .any(|(a, b)| a.name != b.name || a.features != b.features)
        {
            return Err(OmicsError::configuration(
                "held-out dataset",
                "layers or features differ from the training dataset",
            ));
        }

        let samples = self.store.samples().to_vec();
        for variable in reference.variable_types.keys() {
            if !self.annotation.has_variable(variable) {
                tracing::debug!(variable = %variable, "held-out annotation lacks variable; labels missing");
            }
        }

        let labels = encode_labels(
            self.annotation,
            &samples,
            &reference.variable_types,
            &reference.label_mappings,
        )?;
        let builder = DatasetBuilder {
            graph_neighbors: reference.graph_neighbors,
            ..self
        };
        let graph = builder.sample_graph(&layers)?;

        Ok(MultiOmicDataset {
            samples,
            layers,
            labels,
            variable_types: reference.variable_types.clone(),
            label_mappings: reference.label_mappings.clone(),
            target_variables: reference.target_variables.clone(),
            batch_variables: reference.batch_variables.clone(),
            survival: reference.survival.clone(),
            fusion: reference.fusion,
            graph_neighbors: reference.graph_neighbors,
            graph,
        })
    }

    fn all_variables(&self) -> Vec<String> {
        let mut all: Vec<String> = self.targets.iter().chain(&self.batch_variables).cloned().collect();
        if let Some(pair) = &self.survival {
            all.push(pair.event.clone());
            all.push(pair.time.clone());
        }
        all
    }

    fn sample_graph(&self, layers: &[OmicLayer]) -> OmicsResult<Option<SampleGraph>> {
        self.graph_neighbors
            .map(|k| {
                let features = concatenate_columns(layers.iter().map(|l| l.values.view()))?;
                SampleGraph::knn(&features, k)
            })
            .transpose()
    }
}

/// `build(layers, annotation, target_vars, batch_vars, fusion_mode)`.
pub fn build_dataset(
    store: &LayerStore,
    annotation: &Annotation,
    targets: &[&str],
    batch_variables: &[&str],
    fusion: &str,
) -> OmicsResult<MultiOmicDataset> {
    let fusion = fusion.parse::<FusionMode>()?;
    DatasetBuilder::new(store, annotation)
        .targets(targets.iter().copied())
        .batch_variables(batch_variables.iter().copied())
        .fusion(fusion)
        .build()
}

fn assemble_layers(store: &LayerStore, fusion: FusionMode) -> OmicsResult<Vec<OmicLayer>> {
    let per_layer: Vec<OmicLayer> = store
        .layers()
        .iter()
        .map(|layer| OmicLayer {
            name: layer.name.clone(),
            features: layer
                .features
                .iter()
                .map(|f| FeatureId {
                    layer: layer.name.clone(),
                    name: f.clone(),
                })
                .collect(),
            values: layer.values.clone(),
        })
        .collect();

    match fusion {
        FusionMode::Intermediate => Ok(per_layer),
        FusionMode::Early => {
            let values = concatenate_columns(per_layer.iter().map(|l| l.values.view()))?;
            let features = per_layer.into_iter().flat_map(|l| l.features).collect();
            Ok(vec![OmicLayer {
                name: FUSED_LAYER.to_string(),
                features,
                values,
            }])
        }
    }
}

fn concatenate_columns<'v>(
    views: impl Iterator<Item = ArrayView2<'v, f32>>,
) -> OmicsResult<Array2<f32>> {
    let views: Vec<ArrayView2<f32>> = views.collect();
    ndarray::concatenate(Axis(1), &views).map_err(|err| {
        OmicsError::configuration("layer concatenation", err.to_string())
    })
}

fn encode_labels(
    annotation: &Annotation,
    samples: &[String],
    variable_types: &BTreeMap<String, VariableType>,
    label_mappings: &BTreeMap<String, LabelEncoding>,
) -> OmicsResult<BTreeMap<String, Array1<f32>>> {
    variable_types
        .iter()
        .map(|(variable, kind)| {
            let column = annotation.column(variable, samples);
            let encoded: Array1<f32> = match kind {
                VariableType::Categorical => {
                    let encoding = label_mappings.get(variable).ok_or_else(|| {
                        OmicsError::invalid_state(
                            format!("encode '{variable}'"),
                            "categorical variable without label mapping",
                        )
                    })?;
                    column.iter().map(|v| encoding.encode(v)).collect()
                }
                VariableType::Numerical => column.iter().map(numeric_or_nan).collect(),
                VariableType::SurvivalEvent => column
                    .iter()
                    .map(|v| match v.as_number() {
                        None => Ok(f32::NAN),
                        Some(e) if e == 0.0 || e == 1.0 => Ok(e as f32),
                        Some(e) => Err(OmicsError::configuration(
                            format!("survival event '{variable}'"),
                            format!("event indicator must be 0 or 1, found {e}"),
                        )),
                    })
                    .collect::<OmicsResult<Array1<f32>>>()?,
            };
            Ok((variable.clone(), encoded))
        })
        .collect()
}

fn numeric_or_nan(value: &AnnotationValue) -> f32 {
    value.as_number().map(|v| v as f32).unwrap_or(f32::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::data::layer_store::FeatureMatrix;
    use crate::neural::loss::MISSING_CLASS;
    use ndarray::array;

    fn fixture() -> (LayerStore, Annotation) {
        let samples: Vec<String> = ["s1", "s2", "s3", "s4"].iter().map(|s| s.to_string()).collect();
        let gex = FeatureMatrix::new(
            "gex",
            samples.clone(),
            vec!["g0".into(), "g1".into()],
            array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]],
        )
        .unwrap();
        let cnv = FeatureMatrix::new(
            "cnv",
            samples.clone(),
            vec!["c0".into(), "c1".into(), "c2".into()],
            array![[0.0, 1.0, 2.0], [1.0, 1.0, 0.0], [0.0, 2.0, 2.0], [1.0, 0.0, 1.0]],
        )
        .unwrap();

        let mut ann = Annotation::new();
        let rows = [
            ("s1", 1.5, "LumA", 1.0, 10.0),
            ("s2", f64::NAN, "LumB", 0.0, 12.0),
            ("s3", 0.5, "LumA", 1.0, 3.0),
            ("s4", 2.5, "NA", 0.0, 8.0),
        ];
        for (s, age, subtype, event, time) in rows {
            ann.insert(s, "age", age);
            ann.insert(s, "subtype", AnnotationValue::parse(subtype));
            ann.insert(s, "os_status", event);
            ann.insert(s, "os_time", time);
        }

        let config = SelectionConfig {
            min_features: 10,
            top_percentile: 100.0,
        };
        let store = LayerStore::select(&[gex, cnv], &ann, &config).unwrap();
        (store, ann)
    }

    #[test]
    fn test_early_fusion_concatenates_layers() {
        let (store, ann) = fixture();
        let dataset = build_dataset(&store, &ann, &["age"], &[], "early").unwrap();

        assert_eq!(dataset.layers().len(), 1);
        let fused = &dataset.layers()[0];
        assert_eq!(fused.name, FUSED_LAYER);
        assert_eq!(fused.values.ncols(), 5);
        assert_eq!(fused.values.nrows(), 4);
        assert_eq!(fused.features[0].layer, "gex");
        assert_eq!(fused.features[4].layer, "cnv");
    }

    #[test]
    fn test_early_fusion_rows_follow_aligned_samples() {
        // each layer lists the samples in its own order; values grow with the sample number
        let gex = FeatureMatrix::new(
            "gex",
            vec!["s3".into(), "s1".into(), "s2".into()],
            vec!["g0".into(), "g1".into()],
            array![[3.0, 30.0], [1.0, 10.0], [2.0, 20.0]],
        )
        .unwrap();
        let cnv = FeatureMatrix::new(
            "cnv",
            vec!["s2".into(), "s1".into(), "s3".into()],
            vec!["c0".into(), "c1".into()],
            array![[2.0, 200.0], [1.0, 100.0], [3.0, 300.0]],
        )
        .unwrap();
        let mut ann = Annotation::new();
        for (i, s) in ["s1", "s2", "s3"].iter().enumerate() {
            ann.insert(*s, "age", 50.5 + i as f64);
        }
        let config = SelectionConfig {
            min_features: 2,
            top_percentile: 100.0,
        };
        let store = LayerStore::select(&[gex, cnv], &ann, &config).unwrap();
        let dataset = build_dataset(&store, &ann, &["age"], &[], "early").unwrap();

        assert_eq!(dataset.samples(), ["s1", "s2", "s3"]);
        let fused = &dataset.layers()[0].values;
        assert_eq!(fused.dim(), (3, 4));
        for column in fused.columns() {
            assert!(column[0] < 0.0, "{column}");
            assert!(column[1].abs() < 1e-6, "{column}");
            assert!(column[2] > 0.0, "{column}");
        }
        let age = dataset.labels("age").unwrap();
        assert_eq!(age.to_vec(), vec![50.5, 51.5, 52.5]);
    }

    #[test]
    fn test_intermediate_fusion_keeps_layers() {
        let (store, ann) = fixture();
        let dataset = build_dataset(&store, &ann, &["age"], &[], "intermediate").unwrap();
        assert_eq!(dataset.input_dims(), vec![2, 3]);
    }

    #[test]
    fn test_unknown_fusion_mode() {
        let (store, ann) = fixture();
        let err = build_dataset(&store, &ann, &["age"], &[], "late").unwrap_err();
        assert!(matches!(err, OmicsError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_variable() {
        let (store, ann) = fixture();
        let err = build_dataset(&store, &ann, &["grade"], &[], "early").unwrap_err();
        assert!(matches!(err, OmicsError::Configuration { .. }));
    }

    #[test]
    fn test_missing_labels_use_sentinels() {
        let (store, ann) = fixture();
        let dataset = build_dataset(&store, &ann, &["age", "subtype"], &[], "early").unwrap();

        assert_eq!(dataset.variable_type("age"), Some(VariableType::Numerical));
        assert_eq!(dataset.variable_type("subtype"), Some(VariableType::Categorical));
        assert!(dataset.labels("age").unwrap()[1].is_nan());
        assert_eq!(dataset.labels("subtype").unwrap()[3], MISSING_CLASS);
        assert_eq!(
            dataset.label_mappings()["subtype"],
            vec!["LumA".to_string(), "LumB".to_string()]
        );
    }

    #[test]
    fn test_survival_pair_types() {
        let (store, ann) = fixture();
        let dataset = DatasetBuilder::new(&store, &ann)
            .with_survival("os_status", "os_time")
            .build()
            .unwrap();

        assert_eq!(
            dataset.variable_type("os_status"),
            Some(VariableType::SurvivalEvent)
        );
        assert_eq!(dataset.variable_type("os_time"), Some(VariableType::Numerical));
        assert_eq!(dataset.head_variables(), vec!["os_status".to_string()]);
    }

    #[test]
    fn test_batch_and_subset_follow_indices() {
        let (store, ann) = fixture();
        let dataset = DatasetBuilder::new(&store, &ann)
            .targets(["age"])
            .with_sample_graph(1)
            .build()
            .unwrap();

        let batch = dataset.batch(&[2, 0]);
        assert_eq!(batch.inputs[0].row(0), dataset.layers()[0].values.row(2));
        assert_eq!(batch.adjacency.as_ref().map(|a| a.dim()), Some((2, 2)));

        let subset = dataset.subset(&[3, 1]);
        assert_eq!(subset.samples(), &["s4".to_string(), "s2".to_string()]);
        assert_eq!(subset.graph().map(|g| g.num_nodes()), Some(2));
    }

    #[test]
    fn test_holdout_reuses_label_mappings() {
        let (store, ann) = fixture();
        let train = build_dataset(&store, &ann, &["subtype"], &[], "early").unwrap();

        let mut test_ann = Annotation::new();
        test_ann.insert("t1", "subtype", "Basal");
        test_ann.insert("t2", "subtype", "LumB");
        let test_layers = vec![
            FeatureMatrix::new(
                "gex",
                vec!["t1".into(), "t2".into()],
                vec!["g1".into(), "g0".into()],
                array![[0.0, 1.0], [1.0, 2.0]],
            )
            .unwrap(),
            FeatureMatrix::new(
                "cnv",
                vec!["t1".into(), "t2".into()],
                vec!["c0".into(), "c1".into(), "c2".into()],
                array![[0.0, 1.0, 2.0], [1.0, 1.0, 0.0]],
            )
            .unwrap(),
        ];
        let test_store = LayerStore::align_to(&test_layers, &test_ann, &store).unwrap();
        let test = DatasetBuilder::new(&test_store, &test_ann)
            .build_holdout(&train)
            .unwrap();

        let labels = test.labels("subtype").unwrap();
        assert_eq!(labels[0], MISSING_CLASS);
        assert_eq!(labels[1], 1.0);
        assert_eq!(test.layers()[0].features, train.layers()[0].features);
    }
}
