use std::collections::BTreeMap;

use multiomic_core::data::synthetic::{
    CohortConfig, SyntheticCohort, EVENT_VARIABLE, RESPONSE_VARIABLE, SUBTYPE_VARIABLE, TIME_VARIABLE,
};
use multiomic_core::tuning::space::ParamSpec;
use multiomic_core::{
    build_dataset, evaluate, importance, search, Annotation, Checkpointable, DatasetBuilder, EncoderKind,
    FeatureMatrix, FeedForwardEncoder, FusionMode, GraphEncoder, HyperparameterTuner, LayerStore, ModelCore,
    ModelState, MultiOmicDataset, OmicsError, SearchConfig, SearchSpace, SelectionConfig, TrainingConfig,
    TripletEncoder, VariationalEncoder,
};
use ndarray::Array2;

fn layer(name: &str, samples: &[String], offset: f32) -> FeatureMatrix {
    let values = Array2::from_shape_fn((samples.len(), 5), |(i, j)| {
        ((i * 5 + j) as f32 * 0.37 + offset).sin() + i as f32 * 0.1 * (j as f32 + 1.0)
    });
    FeatureMatrix::new(
        name,
        samples.to_vec(),
        (0..5).map(|j| format!("{name}_{j}")).collect(),
        values,
    )
    .expect("valid matrix")
}

fn quick_training() -> TrainingConfig {
    TrainingConfig {
        max_epochs: 10,
        patience: 3,
        batch_size: 4,
        ..Default::default()
    }
}

fn small_space(kind: EncoderKind) -> SearchSpace {
    SearchSpace::for_encoder(kind).merged(
        &SearchSpace::new()
            .with("latent_dim", ParamSpec::integer(2, 4))
            .with("supervisor_hidden_dim", ParamSpec::integer(2, 4)),
    )
}

fn synthetic_store(num_samples: usize) -> (SyntheticCohort, Annotation, LayerStore) {
    let cohort = SyntheticCohort::generate(&CohortConfig {
        num_samples,
        ..Default::default()
    })
    .expect("cohort");
    let annotation = cohort.annotation();
    let store = LayerStore::select(
        cohort.layers(),
        &annotation,
        &SelectionConfig {
            min_features: 6,
            top_percentile: 20.0,
        },
    )
    .expect("store");
    (cohort, annotation, store)
}

#[test]
fn end_to_end_two_layers_early_fusion() {
    let samples: Vec<String> = (0..10).map(|i| format!("p{i:02}")).collect();
    let layers = [layer("rna", &samples, 0.0), layer("methyl", &samples, 1.3)];
    let mut annotation = Annotation::new();
    for (i, sample) in samples.iter().enumerate() {
        annotation.insert(sample.as_str(), "score", 1.5 * i as f64 - 4.0);
    }

    let store = LayerStore::select(&layers, &annotation, &SelectionConfig::default()).expect("store");
    let dataset = build_dataset(&store, &annotation, &["score"], &[], "early").expect("dataset");
    assert_eq!(dataset.layers().len(), 1);
    assert_eq!(dataset.layers()[0].values.ncols(), 10);

    let outcome = HyperparameterTuner::new(
        quick_training(),
        SearchConfig {
            n_iter: 2,
            ..Default::default()
        },
    )
    .with_space(small_space(EncoderKind::FeedForward))
    .search::<FeedForwardEncoder>(&dataset)
    .expect("search");
    let model = outcome.model;
    assert!(outcome.params.get("lr").is_some());
    assert_eq!(model.state(), ModelState::Trained);

    // loss on the held-out validation split, not the full dataset
    assert!(outcome.validation_loss.is_finite() && outcome.validation_loss >= 0.0);
    let best = &outcome.trials[outcome.best_iteration];
    assert_eq!(best.validation_loss, Some(outcome.validation_loss));

    let predictions = model.predict(&dataset).expect("predict");
    assert_eq!(predictions.get("score").expect("score head").values.dim(), (10, 1));

    let rows = importance(&model, &dataset, "score", 5).expect("importance");
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|r| r.importance.is_finite()));
    assert_eq!(rows.iter().filter(|r| r.layer == "rna").count(), 5);
    assert_eq!(rows.iter().filter(|r| r.layer == "methyl").count(), 5);
}

#[test]
fn unknown_fusion_mode_is_configuration_error() {
    let (_, annotation, store) = synthetic_store(12);
    let err = build_dataset(&store, &annotation, &[RESPONSE_VARIABLE], &[], "late").unwrap_err();
    assert!(matches!(err, OmicsError::Configuration { .. }));
}

#[test]
fn held_out_dataset_reuses_training_features() {
    let cohort = SyntheticCohort::generate(&CohortConfig {
        num_samples: 30,
        ..Default::default()
    })
    .expect("cohort");
    let (train_cohort, test_cohort) = cohort.split(0.7).expect("split");
    let train_annotation = train_cohort.annotation();
    let test_annotation = test_cohort.annotation();

    let train_store = LayerStore::select(train_cohort.layers(), &train_annotation, &SelectionConfig::default())
        .expect("train store");
    let test_store = LayerStore::align_to(test_cohort.layers(), &test_annotation, &train_store).expect("test store");
    assert_eq!(train_store.selected_features(), test_store.selected_features());

    let train = DatasetBuilder::new(&train_store, &train_annotation)
        .targets([RESPONSE_VARIABLE, SUBTYPE_VARIABLE])
        .with_survival(EVENT_VARIABLE, TIME_VARIABLE)
        .build()
        .expect("train dataset");
    let test = DatasetBuilder::new(&test_store, &test_annotation)
        .build_holdout(&train)
        .expect("test dataset");
    assert_eq!(test.input_dims(), train.input_dims());
    assert_eq!(test.label_mappings(), train.label_mappings());

    let (model, _) =
        search::<FeedForwardEncoder>(&train, &small_space(EncoderKind::FeedForward), 2, &quick_training())
            .expect("search");

    let predictions = model.predict(&test).expect("predict");
    let embedding = model.transform(&test).expect("transform");
    assert_eq!(predictions.samples, embedding.samples);
    assert_eq!(predictions.samples, test.samples());

    let metrics = evaluate(&model, &test).expect("evaluate");
    let variables: Vec<&str> = metrics.iter().map(|r| r.variable.as_str()).collect();
    assert!(variables.contains(&RESPONSE_VARIABLE));
    assert!(variables.contains(&EVENT_VARIABLE));
}

#[test]
fn checkpoint_roundtrip_preserves_predictions() {
    let (_, annotation, store) = synthetic_store(20);
    let dataset = DatasetBuilder::new(&store, &annotation)
        .targets([RESPONSE_VARIABLE, SUBTYPE_VARIABLE])
        .build()
        .expect("dataset");
    let (model, _) =
        search::<VariationalEncoder>(&dataset, &small_space(EncoderKind::Variational), 1, &quick_training())
            .expect("search");

    let path = std::env::temp_dir().join(format!("model-{}.bin", uuid::Uuid::new_v4()));
    model.save_checkpoint(&path).expect("save");
    let restored = ModelCore::<VariationalEncoder>::load_checkpoint(&path).expect("load");
    std::fs::remove_file(&path).expect("cleanup");

    assert_eq!(restored.state(), ModelState::Trained);
    assert_eq!(restored.params(), model.params());
    let before = model.predict(&dataset).expect("predict");
    let after = restored.predict(&dataset).expect("predict");
    assert_eq!(before, after);
}

#[test]
fn cancellation_before_first_trial_exhausts_search() {
    let (_, annotation, store) = synthetic_store(16);
    let dataset = DatasetBuilder::new(&store, &annotation)
        .targets([RESPONSE_VARIABLE])
        .build()
        .expect("dataset");

    let tuner = HyperparameterTuner::new(
        quick_training(),
        SearchConfig {
            n_iter: 3,
            ..Default::default()
        },
    );
    tuner.cancel_handle().store(true, std::sync::atomic::Ordering::Relaxed);

    match tuner.search::<FeedForwardEncoder>(&dataset) {
        Err(OmicsError::SearchExhausted { attempted, failed, .. }) => {
            assert_eq!(attempted, 3);
            assert_eq!(failed, 3);
        }
        other => panic!("expected SearchExhausted, got {other:?}"),
    }
}

#[test]
fn graph_and_triplet_encoders_train() {
    let (_, annotation, store) = synthetic_store(24);
    let dataset = DatasetBuilder::new(&store, &annotation)
        .targets([SUBTYPE_VARIABLE, RESPONSE_VARIABLE])
        .fusion(FusionMode::Early)
        .with_sample_graph(4)
        .build()
        .expect("dataset");

    let (graph_model, _) =
        search::<GraphEncoder>(&dataset, &small_space(EncoderKind::Graph), 1, &quick_training()).expect("graph");
    let (triplet_model, params) =
        search::<TripletEncoder>(&dataset, &small_space(EncoderKind::Triplet), 1, &quick_training())
            .expect("triplet");
    assert!(params.get("margin").is_some());

    for embedding in [
        graph_model.transform(&dataset).expect("graph embedding"),
        triplet_model.transform(&dataset).expect("triplet embedding"),
    ] {
        assert_eq!(embedding.samples.len(), 24);
        assert!(embedding.values.iter().all(|v| v.is_finite()));
    }

    let rows = importance(&graph_model, &dataset, SUBTYPE_VARIABLE, 3).expect("importance");
    let classes = dataset.label_mappings()[SUBTYPE_VARIABLE].len();
    assert_eq!(rows.len(), classes * dataset.input_dims()[0]);
}

#[test]
fn graph_encoder_requires_sample_graph() {
    let (_, annotation, store) = synthetic_store(12);
    let dataset = DatasetBuilder::new(&store, &annotation)
        .targets([RESPONSE_VARIABLE])
        .build()
        .expect("dataset");
    let err = search::<GraphEncoder>(&dataset, &small_space(EncoderKind::Graph), 2, &quick_training()).unwrap_err();
    assert!(matches!(err, OmicsError::SearchExhausted { failed: 2, .. }));
}

#[test]
fn search_journals_are_written() {
    let (_, annotation, store) = synthetic_store(12);
    let dataset = DatasetBuilder::new(&store, &annotation)
        .targets([RESPONSE_VARIABLE])
        .build()
        .expect("dataset");
    let dir = std::env::temp_dir().join(format!("search-{}", uuid::Uuid::new_v4()));

    let outcome = HyperparameterTuner::new(
        quick_training(),
        SearchConfig {
            n_iter: 2,
            log_dir: Some(dir.clone()),
            ..Default::default()
        },
    )
    .with_space(small_space(EncoderKind::FeedForward))
    .search::<FeedForwardEncoder>(&dataset)
    .expect("search");

    let trials = std::fs::read_to_string(dir.join("trials.jsonl")).expect("trials journal");
    assert_eq!(trials.lines().count(), 2);
    let epochs = std::fs::read_to_string(dir.join("epochs.jsonl")).expect("epochs journal");
    let logged: usize = outcome.trials.iter().map(|t| t.epochs_run).sum();
    assert_eq!(epochs.lines().count(), logged);

    let by_iteration: BTreeMap<usize, Option<f32>> =
        outcome.trials.iter().map(|t| (t.iteration, t.validation_loss)).collect();
    assert_eq!(by_iteration.len(), 2);
    std::fs::remove_dir_all(dir).expect("cleanup");
}

fn _assert_send<T: Send>() {}

#[test]
fn datasets_and_models_are_send() {
    _assert_send::<MultiOmicDataset>();
    _assert_send::<ModelCore<FeedForwardEncoder>>();
}
