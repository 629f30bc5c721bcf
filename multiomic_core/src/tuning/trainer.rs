//! Epoch loop with early stopping for a single configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::TrainingConfig;
use crate::data::dataset::MultiOmicDataset;
use crate::error::{OmicsError, OmicsResult};
use crate::logging::{timestamp_ms, EpochLogEntry, Journal};
use crate::model::{Encoder, ModelCore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub epochs_run: usize,
    /// Epoch whose parameters the model holds after `fit`
    pub best_epoch: usize,
    pub best_val_loss: f32,
    pub stopped_early: bool,
    pub cancelled: bool,
    pub history: Vec<EpochMetrics>,
}

impl FitReport {
    pub fn completed_any_epoch(&self) -> bool {
        self.epochs_run > 0
    }
}

/// Trains one model: shuffled mini-batches, validation after every epoch,
/// stop after `patience` epochs without improvement, restore the best epoch.
pub struct Trainer {
    config: TrainingConfig,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    journal: Option<Journal>,
    trial: usize,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            cancel: None,
            deadline: None,
            journal: None,
            trial: 0,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_journal(mut self, journal: Option<Journal>, trial: usize) -> Self {
        self.journal = journal;
        self.trial = trial;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn should_stop(&self) -> bool {
        let cancelled = self
            .cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed));
        let expired = self.deadline.map_or(false, |d| Instant::now() >= d);
        cancelled || expired
    }

    pub fn fit<E: Encoder>(
        &self,
        model: &mut ModelCore<E>,
        train: &MultiOmicDataset,
        validation: &MultiOmicDataset,
        seed: u64,
    ) -> OmicsResult<FitReport> {
        if train.is_empty() {
            return Err(OmicsError::configuration("training", "training set is empty"));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let batch_size = self.config.batch_size.max(1);

        let mut best_loss = f32::INFINITY;
        let mut best_epoch = 0;
        let mut best_model: Option<ModelCore<E>> = None;
        let mut patience_counter = 0;
        let mut history = Vec::new();
        let mut stopped_early = false;
        let mut cancelled = false;

        for epoch in 1..=self.config.max_epochs {
            if self.should_stop() {
                cancelled = true;
                tracing::debug!(trial = self.trial, epoch, "training cancelled");
                break;
            }

            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            let mut num_batches = 0;
            for chunk in indices.chunks(batch_size) {
                let batch = train.batch(chunk);
                let report = model.train_step(&batch).map_err(|err| match err {
                    OmicsError::TrainingInstability { details, .. } => OmicsError::instability(epoch, details),
                    other => other,
                })?;
                epoch_loss += report.total;
                num_batches += 1;
            }
            let train_loss = epoch_loss / num_batches as f32;

            let val_loss = model.validation_loss(validation)?;
            if !val_loss.is_finite() {
                return Err(OmicsError::instability(epoch, "non-finite validation loss"));
            }

            tracing::debug!(
                "Epoch {}/{}: train_loss={:.4}, val_loss={:.4}",
                epoch,
                self.config.max_epochs,
                train_loss,
                val_loss
            );
            if let Some(journal) = &self.journal {
                let entry = EpochLogEntry {
                    trial: self.trial,
                    epoch,
                    train_loss,
                    val_loss,
                    timestamp_ms: timestamp_ms(),
                };
                if let Err(err) = journal.log_epoch(&entry) {
                    tracing::warn!("failed to write epoch journal: {err}");
                }
            }
            history.push(EpochMetrics {
                epoch,
                train_loss,
                val_loss,
            });

            if val_loss < best_loss {
                best_loss = val_loss;
                best_epoch = epoch;
                best_model = Some(model.clone());
                patience_counter = 0;
            } else {
                patience_counter += 1;
                if patience_counter >= self.config.patience {
                    tracing::debug!(trial = self.trial, epoch, "early stopping");
                    stopped_early = true;
                    break;
                }
            }
        }

        if let Some(best) = best_model {
            *model = best;
        }
        model.finish_training();

        Ok(FitReport {
            epochs_run: history.len(),
            best_epoch,
            best_val_loss: best_loss,
            stopped_early,
            cancelled,
            history,
        })
    }
}
