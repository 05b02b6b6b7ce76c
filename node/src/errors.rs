// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use fossil_kernel::error::{CodecError, MerkleError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FossilizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Recovery of {path:?} failed: {source}")]
    Recovery {
        path: PathBuf,
        #[source]
        source: Box<FossilizerError>,
    },

    #[error("Merkle commit failed: {0}")]
    Commit(#[from] MerkleError),

    /// A batch task panicked or was aborted.
    #[error("Batch worker failed: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scheduler is not running (never started, or already shut down).
    #[error("fossilizer is stopped")]
    Stopped,

    /// The cancellation handle fired; the normal way `start` returns.
    #[error("fossilizer was cancelled")]
    Cancelled,

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl FossilizerError {
    pub(crate) fn recovery(path: impl Into<PathBuf>, source: impl Into<FossilizerError>) -> Self {
        FossilizerError::Recovery {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }
}

/// Per-leaf transformer failure. Recovered locally: the leaf is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(msg: impl Into<String>) -> Self {
        TransformError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FossilizerError>;
