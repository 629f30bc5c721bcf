//! Random hyperparameter search over independent trials.
//!
//! Every trial samples a configuration from its own seed, trains a fresh
//! model on a shared train/validation split and reports its best validation
//! loss. Trials run on a rayon pool; the best-so-far result sits behind a
//! mutex and is the only state they share. Lowest loss wins, ties go to the
//! earliest iteration, so the outcome does not depend on scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{PipelineConfig, SearchConfig, TrainingConfig};
use crate::data::dataset::MultiOmicDataset;
use crate::error::{OmicsError, OmicsResult};
use crate::logging::{timestamp_ms, Journal, TrialLogEntry};
use crate::model::{Encoder, ModelCore, ModelOptions};
use crate::tuning::space::{HyperParams, SearchSpace};
use crate::tuning::trainer::{FitReport, Trainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
    /// Cancelled or out of time before finishing an epoch
    Skipped,
}

impl TrialStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Completed => "completed",
            TrialStatus::Failed => "failed",
            TrialStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub iteration: usize,
    pub params: HyperParams,
    pub status: TrialStatus,
    pub validation_loss: Option<f32>,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub reason: Option<String>,
}

impl TrialRecord {
    fn skipped(iteration: usize, params: HyperParams, reason: &str) -> Self {
        Self {
            iteration,
            params,
            status: TrialStatus::Skipped,
            validation_loss: None,
            epochs_run: 0,
            best_epoch: 0,
            reason: Some(reason.to_string()),
        }
    }

    fn failed(iteration: usize, params: HyperParams, err: &OmicsError) -> Self {
        Self {
            iteration,
            params,
            status: TrialStatus::Failed,
            validation_loss: None,
            epochs_run: 0,
            best_epoch: 0,
            reason: Some(err.to_string()),
        }
    }

    fn completed(iteration: usize, params: HyperParams, report: &FitReport) -> Self {
        Self {
            iteration,
            params,
            status: TrialStatus::Completed,
            validation_loss: Some(report.best_val_loss),
            epochs_run: report.epochs_run,
            best_epoch: report.best_epoch,
            reason: None,
        }
    }
}

/// Best model found by a search.
#[derive(Debug, Clone)]
pub struct SearchOutcome<E> {
    pub model: ModelCore<E>,
    pub params: HyperParams,
    pub validation_loss: f32,
    pub best_iteration: usize,
    /// Every trial, ordered by iteration
    pub trials: Vec<TrialRecord>,
}

struct BestTrial<E> {
    iteration: usize,
    loss: f32,
    model: ModelCore<E>,
    params: HyperParams,
}

/// Seeded train/validation split of `n` rows; both sides non-empty, sorted.
pub fn split_indices(n: usize, val_fraction: f32, seed: u64) -> OmicsResult<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(OmicsError::configuration(
            "validation split",
            format!("need at least 2 samples, got {n}"),
        ));
    }
    let num_val = ((n as f32 * val_fraction).round() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut validation = indices.split_off(n - num_val);
    indices.sort_unstable();
    validation.sort_unstable();
    Ok((indices, validation))
}

fn trial_seed(seed: u64, iteration: usize) -> u64 {
    seed ^ (iteration as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

pub struct HyperparameterTuner {
    training: TrainingConfig,
    search: SearchConfig,
    space: SearchSpace,
    cancel: Arc<AtomicBool>,
}

impl HyperparameterTuner {
    /// Uses the default space of the configured encoder.
    pub fn new(training: TrainingConfig, search: SearchConfig) -> Self {
        let space = SearchSpace::for_encoder(search.encoder);
        Self {
            training,
            search,
            space,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.training.clone(), config.search.clone()).with_space(config.search_space())
    }

    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Setting the flag stops the search between epochs and before each trial.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn search<E: Encoder>(&self, dataset: &MultiOmicDataset) -> OmicsResult<SearchOutcome<E>> {
        self.space.validate()?;
        if self.search.n_iter == 0 {
            return Err(OmicsError::configuration("search", "n_iter must be at least 1"));
        }
        if E::KIND != self.search.encoder {
            tracing::warn!(
                configured = %self.search.encoder,
                running = %E::KIND,
                "encoder type differs from search configuration"
            );
        }

        let (train_idx, val_idx) = split_indices(dataset.len(), self.training.val_fraction, self.training.seed)?;
        let train = dataset.subset(&train_idx);
        let validation = dataset.subset(&val_idx);

        let journal = match &self.search.log_dir {
            Some(dir) => Some(Journal::create(dir).map_err(|err| {
                OmicsError::configuration("search log directory", err.to_string())
            })?),
            None => None,
        };
        let deadline = self.search.time_budget.map(|budget| Instant::now() + budget);

        let mut pool = rayon::ThreadPoolBuilder::new();
        if self.search.threads > 0 {
            pool = pool.num_threads(self.search.threads);
        }
        let pool = pool
            .build()
            .map_err(|err| OmicsError::configuration("search thread pool", err.to_string()))?;

        tracing::info!(
            encoder = %E::KIND,
            n_iter = self.search.n_iter,
            train = train.len(),
            validation = validation.len(),
            "starting hyperparameter search"
        );

        let best: Mutex<Option<BestTrial<E>>> = Mutex::new(None);
        let mut trials = pool.install(|| {
            (0..self.search.n_iter)
                .into_par_iter()
                .map(|iteration| {
                    let record = self.run_trial(iteration, &train, &validation, deadline, journal.as_ref(), &best)?;
                    if let Some(journal) = &journal {
                        let entry = TrialLogEntry {
                            iteration: record.iteration,
                            status: record.status.as_str().to_string(),
                            validation_loss: record.validation_loss,
                            epochs_run: record.epochs_run,
                            params: record.params.clone(),
                            reason: record.reason.clone(),
                            timestamp_ms: timestamp_ms(),
                        };
                        if let Err(err) = journal.log_trial(&entry) {
                            tracing::warn!("failed to write trial journal: {err}");
                        }
                    }
                    Ok(record)
                })
                .collect::<OmicsResult<Vec<_>>>()
        })?;
        trials.sort_by_key(|t| t.iteration);

        let best = best
            .into_inner()
            .map_err(|_| OmicsError::invalid_state("search", "poisoned best-trial lock"))?;
        let Some(best) = best else {
            let failed = trials.iter().filter(|t| t.status != TrialStatus::Completed).count();
            let reason = trials
                .iter()
                .find_map(|t| t.reason.clone())
                .unwrap_or_else(|| "no trial completed".to_string());
            return Err(OmicsError::SearchExhausted {
                attempted: trials.len(),
                failed,
                reason,
            });
        };

        tracing::info!(
            iteration = best.iteration,
            validation_loss = best.loss,
            "search finished"
        );

        Ok(SearchOutcome {
            model: best.model,
            params: best.params,
            validation_loss: best.loss,
            best_iteration: best.iteration,
            trials,
        })
    }

    fn run_trial<E: Encoder>(
        &self,
        iteration: usize,
        train: &MultiOmicDataset,
        validation: &MultiOmicDataset,
        deadline: Option<Instant>,
        journal: Option<&Journal>,
        best: &Mutex<Option<BestTrial<E>>>,
    ) -> OmicsResult<TrialRecord> {
        let seed = trial_seed(self.training.seed, iteration);
        let params = self.space.sample(&mut StdRng::seed_from_u64(seed));

        if self.cancel.load(Ordering::Relaxed) {
            return Ok(TrialRecord::skipped(iteration, params, "search cancelled"));
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            return Ok(TrialRecord::skipped(iteration, params, "time budget exhausted"));
        }

        let options = ModelOptions {
            seed,
            ..ModelOptions::from(&self.training)
        };
        let trainer = Trainer::new(self.training.clone())
            .with_cancel(Arc::clone(&self.cancel))
            .with_deadline(deadline)
            .with_journal(journal.cloned(), iteration);

        let outcome = ModelCore::<E>::new(train, params.clone(), &options)
            .and_then(|mut model| trainer.fit(&mut model, train, validation, seed).map(|report| (model, report)));

        let (model, report) = match outcome {
            Ok(result) => result,
            Err(err) if err.is_trial_local() => {
                tracing::warn!(iteration, "trial failed: {err}");
                return Ok(TrialRecord::failed(iteration, params, &err));
            }
            Err(err) => return Err(err),
        };

        if !report.completed_any_epoch() {
            return Ok(TrialRecord::skipped(iteration, params, "search cancelled"));
        }

        tracing::info!(
            iteration,
            validation_loss = report.best_val_loss,
            epochs = report.epochs_run,
            "trial completed"
        );

        let record = TrialRecord::completed(iteration, params.clone(), &report);
        let mut guard = best
            .lock()
            .map_err(|_| OmicsError::invalid_state("search", "poisoned best-trial lock"))?;
        let improves = guard.as_ref().map_or(true, |current| {
            report.best_val_loss < current.loss
                || (report.best_val_loss == current.loss && iteration < current.iteration)
        });
        if improves {
            *guard = Some(BestTrial {
                iteration,
                loss: report.best_val_loss,
                model,
                params,
            });
        }
        Ok(record)
    }
}

/// Search with default search settings and an explicit space.
///
/// The dataset's target and batch variables decide which heads are trained.
pub fn search<E: Encoder>(
    dataset: &MultiOmicDataset,
    space: &SearchSpace,
    n_iter: usize,
    training: &TrainingConfig,
) -> OmicsResult<(ModelCore<E>, HyperParams)> {
    let search = SearchConfig {
        encoder: E::KIND,
        n_iter,
        ..SearchConfig::default()
    };
    let outcome = HyperparameterTuner::new(training.clone(), search)
        .with_space(space.clone())
        .search::<E>(dataset)?;
    Ok((outcome.model, outcome.params))
}
