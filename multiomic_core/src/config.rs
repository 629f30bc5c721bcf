//! Pipeline configuration via TOML files.
//!
//! Every section is optional and falls back to defaults. Raw serde structs
//! are validated into the typed configs used by the rest of the crate.
//!
//! ```toml
//! [selection]
//! min_features = 500
//! top_percentile = 20.0
//!
//! [dataset]
//! fusion = "early"
//! target_variables = ["subtype"]
//!
//! [training]
//! max_epochs = 200
//! patience = 10
//!
//! [search]
//! encoder = "feed_forward"
//! n_iter = 20
//!
//! [space.latent_dim]
//! type = "integer"
//! low = 16
//! high = 64
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::dataset::{FusionMode, SurvivalPair};
use crate::tuning::space::{EncoderKind, SearchSpace};

/// Full pipeline configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineConfig {
    pub selection: SelectionConfig,
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub search: SearchConfig,
    /// Overrides merged into the encoder's default search space
    pub space: SearchSpace,
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawPipelineConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let selection = SelectionConfig::try_from(&raw.selection)?;
        let dataset = DatasetConfig::try_from(&raw.dataset)?;
        let training = TrainingConfig::try_from(&raw.training)?;
        let search = SearchConfig::try_from(&raw.search)?;
        if !raw.space.is_empty() {
            raw.space
                .validate()
                .map_err(|err| ConfigError::Parse(err.to_string()))?;
        }

        Ok(Self {
            selection,
            dataset,
            training,
            search,
            space: raw.space,
        })
    }

    /// Default space of the configured encoder with `[space.*]` overrides.
    pub fn search_space(&self) -> SearchSpace {
        SearchSpace::for_encoder(self.search.encoder).merged(&self.space)
    }
}

/// Feature selection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionConfig {
    /// Lower bound on retained features per layer
    pub min_features: usize,
    /// Percentage of highest-variance features retained per layer
    pub top_percentile: f32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_features: default_min_features(),
            top_percentile: default_top_percentile(),
        }
    }
}

impl SelectionConfig {
    fn try_from(raw: &RawSelection) -> Result<Self, ConfigError> {
        if !raw.top_percentile.is_finite() || raw.top_percentile <= 0.0 || raw.top_percentile > 100.0 {
            return Err(ConfigError::Parse(
                "selection.top_percentile must be in (0, 100]".into(),
            ));
        }

        Ok(Self {
            min_features: raw.min_features,
            top_percentile: raw.top_percentile,
        })
    }
}

/// Variables and fusion for dataset construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetConfig {
    pub fusion: FusionMode,
    pub target_variables: Vec<String>,
    pub batch_variables: Vec<String>,
    pub survival: Option<SurvivalPair>,
    /// Integer columns with at most this many levels are categorical
    pub categorical_max_levels: usize,
    /// Neighbours per sample in the sample graph; `None` builds no graph
    pub graph_neighbors: Option<usize>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            fusion: FusionMode::default(),
            target_variables: Vec::new(),
            batch_variables: Vec::new(),
            survival: None,
            categorical_max_levels: default_categorical_max_levels(),
            graph_neighbors: None,
        }
    }
}

impl DatasetConfig {
    fn try_from(raw: &RawDataset) -> Result<Self, ConfigError> {
        let fusion = raw
            .fusion
            .parse::<FusionMode>()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;

        let survival = match (&raw.survival_event, &raw.survival_time) {
            (Some(event), Some(time)) => Some(SurvivalPair {
                event: event.clone(),
                time: time.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Parse(
                    "dataset.survival_event and dataset.survival_time must be set together".into(),
                ))
            }
        };

        if raw.graph_neighbors == Some(0) {
            return Err(ConfigError::Parse(
                "dataset.graph_neighbors must be at least 1".into(),
            ));
        }

        Ok(Self {
            fusion,
            target_variables: raw.target_variables.clone(),
            batch_variables: raw.batch_variables.clone(),
            survival,
            categorical_max_levels: raw.categorical_max_levels,
            graph_neighbors: raw.graph_neighbors,
        })
    }
}

/// Per-trial training loop settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub batch_size: usize,
    /// Share of the training dataset held out for validation
    pub val_fraction: f32,
    /// Learn one log-variance per task to weight multi-task losses
    pub use_loss_weighting: bool,
    pub weight_decay: f32,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            patience: default_patience(),
            batch_size: default_batch_size(),
            val_fraction: default_val_fraction(),
            use_loss_weighting: true,
            weight_decay: 0.0,
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    fn try_from(raw: &RawTraining) -> Result<Self, ConfigError> {
        if raw.max_epochs == 0 {
            return Err(ConfigError::Parse("training.max_epochs must be non-zero".into()));
        }
        if raw.batch_size == 0 {
            return Err(ConfigError::Parse("training.batch_size must be non-zero".into()));
        }
        if !(raw.val_fraction > 0.0 && raw.val_fraction < 1.0) {
            return Err(ConfigError::Parse(
                "training.val_fraction must be in (0, 1)".into(),
            ));
        }
        if !raw.weight_decay.is_finite() || raw.weight_decay < 0.0 {
            return Err(ConfigError::Parse(
                "training.weight_decay must be non-negative".into(),
            ));
        }

        Ok(Self {
            max_epochs: raw.max_epochs,
            patience: raw.patience,
            batch_size: raw.batch_size,
            val_fraction: raw.val_fraction,
            use_loss_weighting: raw.use_loss_weighting,
            weight_decay: raw.weight_decay,
            seed: raw.seed,
        })
    }
}

/// Hyperparameter search settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    pub encoder: EncoderKind,
    pub n_iter: usize,
    /// Worker threads; 0 uses rayon's default
    pub threads: usize,
    pub time_budget: Option<Duration>,
    /// Directory for JSONL epoch and trial journals
    pub log_dir: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::FeedForward,
            n_iter: default_n_iter(),
            threads: 0,
            time_budget: None,
            log_dir: None,
        }
    }
}

impl SearchConfig {
    fn try_from(raw: &RawSearch) -> Result<Self, ConfigError> {
        let encoder = raw
            .encoder
            .parse::<EncoderKind>()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        if raw.n_iter == 0 {
            return Err(ConfigError::Parse("search.n_iter must be non-zero".into()));
        }
        let time_budget = match raw.time_budget_secs {
            Some(secs) if !secs.is_finite() || secs <= 0.0 => {
                return Err(ConfigError::Parse(
                    "search.time_budget_secs must be positive".into(),
                ))
            }
            Some(secs) => Some(Duration::from_secs_f64(secs)),
            None => None,
        };

        Ok(Self {
            encoder,
            n_iter: raw.n_iter,
            threads: raw.threads,
            time_budget,
            log_dir: raw.log_dir.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawPipelineConfig {
    #[serde(default)]
    selection: RawSelection,
    #[serde(default)]
    dataset: RawDataset,
    #[serde(default)]
    training: RawTraining,
    #[serde(default)]
    search: RawSearch,
    #[serde(default)]
    space: SearchSpace,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    #[serde(default = "default_min_features")]
    min_features: usize,
    #[serde(default = "default_top_percentile")]
    top_percentile: f32,
}

impl Default for RawSelection {
    fn default() -> Self {
        Self {
            min_features: default_min_features(),
            top_percentile: default_top_percentile(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default = "default_fusion")]
    fusion: String,
    #[serde(default)]
    target_variables: Vec<String>,
    #[serde(default)]
    batch_variables: Vec<String>,
    #[serde(default)]
    survival_event: Option<String>,
    #[serde(default)]
    survival_time: Option<String>,
    #[serde(default = "default_categorical_max_levels")]
    categorical_max_levels: usize,
    #[serde(default)]
    graph_neighbors: Option<usize>,
}

impl Default for RawDataset {
    fn default() -> Self {
        Self {
            fusion: default_fusion(),
            target_variables: Vec::new(),
            batch_variables: Vec::new(),
            survival_event: None,
            survival_time: None,
            categorical_max_levels: default_categorical_max_levels(),
            graph_neighbors: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTraining {
    #[serde(default = "default_max_epochs")]
    max_epochs: usize,
    #[serde(default = "default_patience")]
    patience: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_val_fraction")]
    val_fraction: f32,
    #[serde(default = "default_true")]
    use_loss_weighting: bool,
    #[serde(default)]
    weight_decay: f32,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl Default for RawTraining {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            patience: default_patience(),
            batch_size: default_batch_size(),
            val_fraction: default_val_fraction(),
            use_loss_weighting: true,
            weight_decay: 0.0,
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(default = "default_encoder")]
    encoder: String,
    #[serde(default = "default_n_iter")]
    n_iter: usize,
    #[serde(default)]
    threads: usize,
    #[serde(default)]
    time_budget_secs: Option<f64>,
    #[serde(default)]
    log_dir: Option<PathBuf>,
}

impl Default for RawSearch {
    fn default() -> Self {
        Self {
            encoder: default_encoder(),
            n_iter: default_n_iter(),
            threads: 0,
            time_budget_secs: None,
            log_dir: None,
        }
    }
}

fn default_min_features() -> usize {
    500
}

fn default_top_percentile() -> f32 {
    20.0
}

fn default_fusion() -> String {
    "intermediate".to_string()
}

fn default_categorical_max_levels() -> usize {
    2
}

fn default_max_epochs() -> usize {
    200
}

fn default_patience() -> usize {
    10
}

fn default_batch_size() -> usize {
    64
}

fn default_val_fraction() -> f32 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_encoder() -> String {
    "feed_forward".to_string()
}

fn default_n_iter() -> usize {
    10
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::space::ParamSpec;

    #[test]
    fn pipeline_config_defaults_when_sections_missing() {
        let config = PipelineConfig::from_str("").unwrap();
        assert_eq!(config.selection, SelectionConfig::default());
        assert_eq!(config.dataset, DatasetConfig::default());
        assert_eq!(config.training, TrainingConfig::default());
        assert_eq!(config.search, SearchConfig::default());
        assert!(config.space.is_empty());
    }

    #[test]
    fn pipeline_config_parses_custom_values() {
        let toml = r#"
            [selection]
            min_features = 50
            top_percentile = 10.0

            [dataset]
            fusion = "early"
            target_variables = ["subtype", "age"]
            survival_event = "os_status"
            survival_time = "os_time"

            [training]
            max_epochs = 30
            patience = 3
            use_loss_weighting = false

            [search]
            encoder = "triplet"
            n_iter = 4
            time_budget_secs = 60.0

            [space.latent_dim]
            type = "integer"
            low = 4
            high = 8
        "#;
        let config = PipelineConfig::from_str(toml).unwrap();

        assert_eq!(config.selection.min_features, 50);
        assert_eq!(config.dataset.fusion, FusionMode::Early);
        assert_eq!(config.dataset.target_variables, vec!["subtype", "age"]);
        assert_eq!(
            config.dataset.survival.as_ref().map(|s| s.event.as_str()),
            Some("os_status")
        );
        assert_eq!(config.training.max_epochs, 30);
        assert!(!config.training.use_loss_weighting);
        assert_eq!(config.search.encoder, EncoderKind::Triplet);
        assert_eq!(config.search.time_budget, Some(Duration::from_secs(60)));

        let space = config.search_space();
        assert_eq!(space.params()["latent_dim"], ParamSpec::integer(4, 8));
        assert!(space.params().contains_key("margin"));
    }

    #[test]
    fn pipeline_config_rejects_unknown_fusion() {
        let err = PipelineConfig::from_str("[dataset]\nfusion = \"late\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn pipeline_config_rejects_half_survival_pair() {
        let err = PipelineConfig::from_str("[dataset]\nsurvival_event = \"os\"").unwrap_err();
        assert!(err.to_string().contains("survival"));
    }

    #[test]
    fn pipeline_config_rejects_bad_space() {
        let toml = "[space.lr]\ntype = \"real\"\nlow = 0.0\nhigh = 1.0\nlog_scale = true";
        assert!(PipelineConfig::from_str(toml).is_err());
    }

    #[test]
    fn pipeline_config_rejects_bad_val_fraction() {
        assert!(PipelineConfig::from_str("[training]\nval_fraction = 1.5").is_err());
    }

    #[test]
    fn bundled_pipeline_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/pipeline.toml");
        let config = PipelineConfig::load_from_file(path).unwrap();
        assert_eq!(config.dataset.batch_variables, vec!["center".to_string()]);
        assert!(config.dataset.survival.is_some());
        assert_eq!(config.search.log_dir, Some(PathBuf::from("logs/search")));
    }
}
