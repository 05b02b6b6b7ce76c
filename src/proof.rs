// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Evidence Structures.
//!
//! One `FossilResult` is produced per leaf per batch. Its `Evidence` carries
//! the proof that the leaf was committed under a Merkle root at a given time.
//!
//! # Wire Form
//! ```json
//! {
//!   "backend": "batch",
//!   "provider": "batch",
//!   "proof": { "timestamp": 1700000000, "merkleRoot": "<hex>", "merklePath": [...] }
//! }
//! ```

use crate::merkle::MerklePath;
use crate::types::Digest;
use serde::{Deserialize, Serialize};

/// Backend and provider tag of the batch committer.
pub const BATCH_BACKEND: &str = "batch";

/// Backend tag of the blockchain-timestamped batch composition.
pub const BCBATCH_BACKEND: &str = "bcbatch";

/// Lowercase hex (de)serialization for opaque byte strings.
pub mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(D::Error::custom)
    }
}

/// Proof that a leaf belongs to a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchProof {
    /// Seconds since the Unix epoch, shared by every leaf of the batch.
    pub timestamp: i64,

    #[serde(rename = "merkleRoot")]
    pub root: Digest,

    #[serde(rename = "merklePath")]
    pub path: MerklePath,
}

impl BatchProof {
    pub fn time(&self) -> u64 {
        self.timestamp.max(0) as u64
    }

    /// Structural validity of the path only.
    pub fn is_well_formed(&self) -> bool {
        self.path.validate().is_ok()
    }

    /// Inclusion of `leaf` under this proof's root.
    pub fn verify(&self, leaf: &Digest) -> bool {
        self.path.verify(leaf, &self.root).is_ok()
    }
}

/// Blockchain transaction identifier returned by a timestamper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TransactionId(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// A batch proof whose root was broadcast in a blockchain transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BcBatchProof {
    pub batch: BatchProof,
    pub txid: TransactionId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Proof {
    BcBatch(BcBatchProof),
    Batch(BatchProof),
}

impl Proof {
    /// The underlying batch proof, whichever envelope wraps it.
    pub fn batch(&self) -> &BatchProof {
        match self {
            Proof::Batch(p) => p,
            Proof::BcBatch(p) => &p.batch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evidence {
    pub backend: String,
    pub provider: String,
    pub proof: Proof,
}

impl Evidence {
    /// Evidence as produced by the batch committer.
    pub fn batch(timestamp: i64, root: Digest, path: MerklePath) -> Self {
        Self {
            backend: BATCH_BACKEND.to_string(),
            provider: BATCH_BACKEND.to_string(),
            proof: Proof::Batch(BatchProof {
                timestamp,
                root,
                path,
            }),
        }
    }
}

/// What subscribers receive for every committed leaf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FossilResult {
    pub evidence: Evidence,
    pub data: Digest,
    #[serde(with = "hex_bytes")]
    pub meta: Vec<u8>,
}
