// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// Failure while decoding a fossil record stream.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a record.
    #[error("Truncated record at offset {offset}")]
    Truncated { offset: u64 },

    #[error("Checksum mismatch: expected {expected:#018x}, found {found:#018x}")]
    ChecksumMismatch { expected: u64, found: u64 },

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record length {0} exceeds the frame limit")]
    RecordTooLarge(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree should have at least one leaf")]
    EmptyTree,

    #[error("Invalid digest length: expected 32, found {0}")]
    InvalidDigestLength(usize),
}

/// Structural failure of a Merkle path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected parent hash at step {index}")]
    ParentMismatch { index: usize },

    #[error("parent of step {index} is not a child of the next step")]
    BrokenLink { index: usize },

    #[error("leaf is not part of the first path step")]
    LeafNotFound,

    #[error("path does not end at the expected root")]
    RootMismatch,
}

pub type Result<T> = std::result::Result<T, CodecError>;
