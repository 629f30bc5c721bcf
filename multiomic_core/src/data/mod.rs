//! Omics layers, annotation, and model-ready datasets.

pub mod annotation;
pub mod dataset;
pub mod graph;
pub mod layer_store;
pub mod synthetic;
pub mod variable;

pub use annotation::{Annotation, AnnotationValue};
pub use dataset::{
    build_dataset, Batch, DatasetBuilder, FeatureId, FusionMode, MultiOmicDataset, OmicLayer,
    SurvivalPair, FUSED_LAYER,
};
pub use graph::SampleGraph;
pub use layer_store::{FeatureMatrix, FeatureStats, LayerData, LayerStore};
pub use synthetic::{CohortConfig, LayerSpec, SyntheticCohort};
pub use variable::{infer_variable_type, LabelEncoding, VariableType};
