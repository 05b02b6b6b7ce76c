// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! fossil-kernel: digests, the fossil journal codec, the static Merkle tree
//! and the evidence types shared by the node and the offline verifier.
//!
//! Nothing in this crate performs I/O beyond the `Read`/`Write` handles it is
//! given, and nothing here is async.

pub mod error;
pub mod types;
pub mod codec;
pub mod merkle;
pub mod proof;

pub use error::{CodecError, MerkleError, PathError};
pub use merkle::{MerkleNodeHashes, MerklePath, StaticTree};
pub use proof::{BatchProof, BcBatchProof, Evidence, FossilResult, Proof, TransactionId};
pub use types::{Digest, Fossil};
