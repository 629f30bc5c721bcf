//! Benchmarks for the numerically heaviest operations: feature attribution
//! and one training epoch.
//!
//! Run with: cargo bench --bench attribution_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use multiomic_core::data::synthetic::{CohortConfig, LayerSpec, SyntheticCohort, RESPONSE_VARIABLE};
use multiomic_core::{
    importance_with, Baseline, DatasetBuilder, FeedForwardEncoder, FusionMode, HyperParams, ImportanceOptions,
    LayerStore, ModelCore, ModelOptions, MultiOmicDataset, ParamValue, SelectionConfig,
};

fn dataset(num_samples: usize, num_features: usize) -> MultiOmicDataset {
    let cohort = SyntheticCohort::generate(&CohortConfig {
        num_samples,
        layers: vec![
            LayerSpec {
                name: "gex".into(),
                num_features,
            },
            LayerSpec {
                name: "cnv".into(),
                num_features,
            },
        ],
        ..Default::default()
    })
    .expect("cohort");
    let annotation = cohort.annotation();
    let store = LayerStore::select(
        cohort.layers(),
        &annotation,
        &SelectionConfig {
            min_features: num_features,
            top_percentile: 100.0,
        },
    )
    .expect("store");
    DatasetBuilder::new(&store, &annotation)
        .targets([RESPONSE_VARIABLE])
        .fusion(FusionMode::Intermediate)
        .build()
        .expect("dataset")
}

fn model(data: &MultiOmicDataset) -> ModelCore<FeedForwardEncoder> {
    let params = HyperParams::new()
        .with("latent_dim", ParamValue::Integer(16))
        .with("hidden_dim_factor", ParamValue::Real(0.5))
        .with("lr", ParamValue::Real(0.001))
        .with("supervisor_hidden_dim", ParamValue::Integer(8));
    ModelCore::new(data, params, &ModelOptions::default()).expect("model")
}

/// Integrated gradients across step counts
fn bench_importance_steps(c: &mut Criterion) {
    let data = dataset(128, 200);
    let mut trained = model(&data);
    trained.finish_training();

    let mut group = c.benchmark_group("importance_steps");
    for steps in [5, 20, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            let options = ImportanceOptions {
                steps,
                batch_size: 64,
                baseline: Baseline::Zero,
            };
            b.iter(|| black_box(importance_with(&trained, &data, RESPONSE_VARIABLE, &options).expect("importance")));
        });
    }
    group.finish();
}

/// Batch size trades parallelism against per-batch matrix size
fn bench_importance_batch_size(c: &mut Criterion) {
    let data = dataset(256, 100);
    let mut trained = model(&data);
    trained.finish_training();

    let mut group = c.benchmark_group("importance_batch_size");
    for batch_size in [16, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &batch_size| {
            let options = ImportanceOptions {
                steps: 10,
                batch_size,
                baseline: Baseline::Mean,
            };
            b.iter(|| black_box(importance_with(&trained, &data, RESPONSE_VARIABLE, &options).expect("importance")));
        });
    }
    group.finish();
}

fn bench_train_epoch(c: &mut Criterion) {
    let data = dataset(128, 200);
    let indices: Vec<usize> = (0..data.len()).collect();
    let batches: Vec<_> = indices.chunks(32).map(|chunk| data.batch(chunk)).collect();

    c.bench_function("train_epoch_128x400", |b| {
        let mut model = model(&data);
        b.iter(|| {
            for batch in &batches {
                black_box(model.train_step(batch).expect("step"));
            }
        });
    });
}

criterion_group!(benches, bench_importance_steps, bench_importance_batch_size, bench_train_epoch);
criterion_main!(benches);
