//! Checkpoint trait and error handling for deterministic model persistence.
//!
//! This module provides a reusable [`Checkpointable`] trait that enforces a
//! deterministic, versioned serialization contract. Implementations store a
//! version header alongside the serialized payload so that incompatible
//! files are rejected during load.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::model::{Encoder, ModelCore};
use crate::tuning::space::EncoderKind;

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug)]
pub enum CheckpointError {
    /// Underlying I/O failure while reading or writing checkpoint files.
    Io(std::io::Error),
    /// Serialization or deserialization error from the binary codec.
    Serialization(bincode::Error),
    /// The checkpoint file was well formed but produced an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },
    /// The checkpoint file did not match the expected structure.
    InvalidFormat(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "I/O error while accessing checkpoint: {err}"),
            CheckpointError::Serialization(err) => {
                write!(f, "Failed to (de)serialize checkpoint payload: {err}")
            }
            CheckpointError::VersionMismatch { expected, found } => write!(
                f,
                "Checkpoint version mismatch: expected {expected}, found {found}",
            ),
            CheckpointError::InvalidFormat(msg) => {
                write!(f, "Checkpoint file has invalid structure: {msg}")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(err: bincode::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

/// Deterministic binary codec options shared by all checkpoint implementations.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_little_endian()
}

/// Components that support deterministic persistence implement this trait.
pub trait Checkpointable: Sized {
    /// Save the current state to `path` using the deterministic codec.
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError>;

    /// Load a state from `path`, replacing any existing instance.
    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError>;

    /// Utility for writing a serializable snapshot with the shared codec.
    fn write_snapshot<P, T>(snapshot: &T, path: P) -> Result<(), CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::Serialize,
    {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        codec().serialize_into(&mut writer, snapshot)?;
        writer.flush()?;
        Ok(())
    }

    /// Utility for reading a serializable snapshot with the shared codec.
    fn read_snapshot<P, T>(path: P) -> Result<T, CheckpointError>
    where
        P: AsRef<Path>,
        T: serde::de::DeserializeOwned,
    {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Ok(codec().deserialize_from(&mut reader)?)
    }
}

pub const MODEL_CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotHeader {
    version: u32,
    encoder: EncoderKind,
}

#[derive(Serialize)]
#[serde(bound = "E: Encoder")]
struct ModelSnapshotRef<'a, E> {
    header: SnapshotHeader,
    model: &'a ModelCore<E>,
}

#[derive(Deserialize)]
#[serde(bound = "E: Encoder")]
struct ModelSnapshot<E> {
    _header: SnapshotHeader,
    model: ModelCore<E>,
}

impl<E: Encoder> Checkpointable for ModelCore<E> {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = ModelSnapshotRef {
            header: SnapshotHeader {
                version: MODEL_CHECKPOINT_VERSION,
                encoder: E::KIND,
            },
            model: self,
        };
        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        // The header is a prefix of the payload; check it before decoding the model
        let header: SnapshotHeader = Self::read_snapshot(path.as_ref())?;
        if header.version != MODEL_CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: MODEL_CHECKPOINT_VERSION,
                found: header.version,
            });
        }
        if header.encoder != E::KIND {
            return Err(CheckpointError::InvalidFormat(format!(
                "checkpoint holds a {} encoder, expected {}",
                header.encoder,
                E::KIND
            )));
        }

        let snapshot: ModelSnapshot<E> = Self::read_snapshot(path)?;
        Ok(snapshot.model)
    }
}
