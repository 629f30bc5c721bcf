//! # Multi-omic Core
//!
//! Supervised integration of several sample-aligned omics layers. Layers are
//! aligned and filtered into a [`LayerStore`], assembled with clinical
//! annotation into a [`MultiOmicDataset`], and used to train a multi-task
//! [`ModelCore`]: one encoder producing a latent embedding, one head per
//! numerical, categorical or survival variable. A [`HyperparameterTuner`]
//! searches encoder configurations, and [`importance`] attributes each
//! variable's predictions to the input features.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multiomic_core::data::synthetic::{CohortConfig, SyntheticCohort, RESPONSE_VARIABLE};
//! use multiomic_core::{
//!     importance, DatasetBuilder, FeedForwardEncoder, FusionMode, HyperparameterTuner, LayerStore,
//!     SearchConfig, SelectionConfig, TrainingConfig,
//! };
//!
//! # fn main() -> Result<(), multiomic_core::OmicsError> {
//! let cohort = SyntheticCohort::generate(&CohortConfig::default())?;
//! let annotation = cohort.annotation();
//! let store = LayerStore::select(cohort.layers(), &annotation, &SelectionConfig::default())?;
//! let dataset = DatasetBuilder::new(&store, &annotation)
//!     .targets([RESPONSE_VARIABLE])
//!     .fusion(FusionMode::Intermediate)
//!     .build()?;
//!
//! let tuner = HyperparameterTuner::new(TrainingConfig::default(), SearchConfig::default());
//! let outcome = tuner.search::<FeedForwardEncoder>(&dataset)?;
//! let rows = importance(&outcome.model, &dataset, RESPONSE_VARIABLE, 5)?;
//! println!("{} features scored", rows.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`config`] - Pipeline configuration via TOML
//! - [`data`] - Layer alignment, feature selection, datasets
//! - [`model`] - Encoders, heads, multi-task losses
//! - [`tuning`] - Search spaces, training loop, hyperparameter search
//! - [`explain`] - Integrated-gradient feature importance
//! - [`evaluate`] - Held-out metrics per variable
//! - [`logging`] - JSON line-delimited journals

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod explain;
pub mod logging;
pub mod model;
pub mod neural;
pub mod tuning;

pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{
    ConfigError, DatasetConfig, PipelineConfig, SearchConfig, SelectionConfig, TrainingConfig,
};
pub use data::{
    build_dataset, Annotation, AnnotationValue, Batch, DatasetBuilder, FeatureMatrix, FusionMode,
    LayerStore, MultiOmicDataset, SampleGraph, VariableType,
};
pub use error::{OmicsError, OmicsResult};
pub use evaluate::evaluate;
pub use explain::{importance, importance_with, Baseline, ImportanceOptions};
pub use model::{
    EmbeddingTable, Encoder, FeedForwardEncoder, GraphEncoder, ModelCore, ModelOptions, ModelState,
    Predictions, TripletEncoder, VariationalEncoder,
};
pub use multiomic_shared::{ImportanceRow, MetricRow};
pub use tuning::{
    search, EncoderKind, HyperParams, HyperparameterTuner, ParamSpec, ParamValue, SearchOutcome,
    SearchSpace, TrialRecord, TrialStatus,
};
