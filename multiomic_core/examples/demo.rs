//! End-to-end run on a synthetic cohort: select features, build train and
//! held-out datasets, search an encoder, evaluate and explain.
//!
//! Run with: cargo run --example demo [config.toml]

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use multiomic_core::config::ConfigError;
use multiomic_core::data::synthetic::{
    CohortConfig, SyntheticCohort, EVENT_VARIABLE, RESPONSE_VARIABLE, SUBTYPE_VARIABLE, TIME_VARIABLE,
};
use multiomic_core::{
    evaluate, importance, Checkpointable, DatasetBuilder, Encoder, EncoderKind, FeedForwardEncoder,
    GraphEncoder, HyperparameterTuner, LayerStore, MultiOmicDataset, PipelineConfig, TripletEncoder,
    VariationalEncoder,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = load_config()?;
    if config.dataset.target_variables.is_empty() {
        config.dataset.target_variables = vec![RESPONSE_VARIABLE.into(), SUBTYPE_VARIABLE.into()];
    }

    let cohort = SyntheticCohort::generate(&CohortConfig {
        num_samples: 120,
        missing_rate: 0.05,
        ..Default::default()
    })?;
    let (train_cohort, test_cohort) = cohort.split(0.75)?;
    let train_annotation = train_cohort.annotation();
    let test_annotation = test_cohort.annotation();

    let train_store = LayerStore::select(train_cohort.layers(), &train_annotation, &config.selection)?;
    let test_store = LayerStore::align_to(test_cohort.layers(), &test_annotation, &train_store)?;
    for (layer, features) in train_store.selected_features() {
        println!("Layer {layer}: {} features retained", features.len());
    }

    let mut builder = DatasetBuilder::new(&train_store, &train_annotation)
        .targets(config.dataset.target_variables.iter().cloned())
        .batch_variables(config.dataset.batch_variables.iter().cloned())
        .fusion(config.dataset.fusion)
        .categorical_max_levels(config.dataset.categorical_max_levels);
    builder = match &config.dataset.survival {
        Some(pair) => builder.with_survival(pair.event.clone(), pair.time.clone()),
        None => builder.with_survival(EVENT_VARIABLE, TIME_VARIABLE),
    };
    let neighbors = match config.search.encoder {
        EncoderKind::Graph => Some(config.dataset.graph_neighbors.unwrap_or(5)),
        _ => config.dataset.graph_neighbors,
    };
    if let Some(k) = neighbors {
        builder = builder.with_sample_graph(k);
    }
    let train = builder.build()?;
    let test = DatasetBuilder::new(&test_store, &test_annotation).build_holdout(&train)?;

    let tuner = HyperparameterTuner::from_config(&config);
    match config.search.encoder {
        EncoderKind::FeedForward => run::<FeedForwardEncoder>(&tuner, &train, &test),
        EncoderKind::Variational => run::<VariationalEncoder>(&tuner, &train, &test),
        EncoderKind::Graph => run::<GraphEncoder>(&tuner, &train, &test),
        EncoderKind::Triplet => run::<TripletEncoder>(&tuner, &train, &test),
    }
}

fn run<E: Encoder>(tuner: &HyperparameterTuner, train: &MultiOmicDataset, test: &MultiOmicDataset) -> Result<()> {
    let outcome = tuner.search::<E>(train)?;
    println!(
        "Best trial {} (validation loss {:.4}):",
        outcome.best_iteration, outcome.validation_loss
    );
    for (name, value) in outcome.params.iter() {
        println!("  {name} = {value}");
    }

    for row in evaluate(&outcome.model, test)? {
        println!("{:<12} {:<16} {:>8.4}", row.variable, row.metric, row.value);
    }

    for variable in outcome.model.variables() {
        let mut rows = importance(&outcome.model, test, variable, 5)?;
        rows.sort_by(|a, b| b.importance.abs().total_cmp(&a.importance.abs()));
        println!("Top features for {variable}:");
        for row in rows.iter().take(5) {
            let class = row.target_class_label.as_deref().unwrap_or("-");
            println!("  {:<8} {:<12} class={class:<4} {:+.4}", row.layer, row.feature, row.importance);
        }
    }

    let embedding = outcome.model.transform(test)?;
    println!("Embedding: {} samples x {} dims", embedding.samples.len(), embedding.columns.len());

    let path = std::env::temp_dir().join("multiomic_demo_model.bin");
    outcome
        .model
        .save_checkpoint(&path)
        .with_context(|| format!("saving checkpoint to {}", path.display()))?;
    println!("Demo complete. Model saved to {}", path.display());
    Ok(())
}

fn load_config() -> Result<PipelineConfig, ConfigError> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(PipelineConfig::default());
    };
    PipelineConfig::load_from_file(&path).or_else(|err| {
        eprintln!("Falling back to default config: {err}");
        Ok(PipelineConfig::default())
    })
}
