use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::tuning::space::HyperParams;

pub fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    // One write per line so concurrent trials never interleave within a record
    let mut line = serde_json::to_vec(value).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)
}

/// JSONL journals of a search run: `epochs.jsonl` and `trials.jsonl`.
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn epochs_path(&self) -> PathBuf {
        self.dir.join("epochs.jsonl")
    }

    pub fn trials_path(&self) -> PathBuf {
        self.dir.join("trials.jsonl")
    }

    pub fn log_epoch(&self, entry: &EpochLogEntry) -> io::Result<()> {
        append_json_line(self.epochs_path(), entry)
    }

    pub fn log_trial(&self, entry: &TrialLogEntry) -> io::Result<()> {
        append_json_line(self.trials_path(), entry)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochLogEntry {
    pub trial: usize,
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub timestamp_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialLogEntry {
    pub iteration: usize,
    pub status: String,
    pub validation_loss: Option<f32>,
    pub epochs_run: usize,
    pub params: HyperParams,
    pub reason: Option<String>,
    pub timestamp_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::space::ParamValue;

    #[test]
    fn test_journal_appends_lines() {
        let dir = std::env::temp_dir().join(format!("journal-{}", uuid::Uuid::new_v4()));
        let journal = Journal::create(&dir).unwrap();

        for epoch in 1..=3 {
            journal
                .log_epoch(&EpochLogEntry {
                    trial: 0,
                    epoch,
                    train_loss: 1.0 / epoch as f32,
                    val_loss: 2.0,
                    timestamp_ms: timestamp_ms(),
                })
                .unwrap();
        }
        journal
            .log_trial(&TrialLogEntry {
                iteration: 0,
                status: "completed".into(),
                validation_loss: Some(2.0),
                epochs_run: 3,
                params: HyperParams::new().with("lr", ParamValue::Real(0.001)),
                reason: None,
                timestamp_ms: timestamp_ms(),
            })
            .unwrap();

        let epochs = fs::read_to_string(journal.epochs_path()).unwrap();
        assert_eq!(epochs.lines().count(), 3);
        let first: serde_json::Value = serde_json::from_str(epochs.lines().next().unwrap()).unwrap();
        assert_eq!(first["epoch"], 1);

        let trials = fs::read_to_string(journal.trials_path()).unwrap();
        assert!(trials.contains("\"completed\""));
        fs::remove_dir_all(dir).unwrap();
    }
}
