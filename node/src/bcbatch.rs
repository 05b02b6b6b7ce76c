// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Blockchain Batch Fossilizer
//!
//! A batch fossilizer whose transformer broadcasts each new batch root to a
//! timestamping network and wraps the batch proof with the transaction id.
//!
//! The transformer remembers only the last root it broadcast, so batches must
//! commit one at a time: `max_sim_batches` above 1 is rejected.

use crate::config::FossilizerConfig;
use crate::errors::{FossilizerError, Result, TransformError};
use crate::emitter::Transformer;
use crate::fossilizer::Fossilizer;
use crate::telemetry::{FossilizerMetrics, RecorderMetrics};
use fossil_kernel::proof::{BcBatchProof, Evidence, FossilResult, Proof, TransactionId, BCBATCH_BACKEND};
use fossil_kernel::types::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::ops::Deref;
use std::sync::{Arc, Mutex};

pub const NAME: &str = BCBATCH_BACKEND;
pub const DESCRIPTION: &str = "Blockchain Batch Fossilizer";

/// Broadcasts a hash to a blockchain and returns the transaction id.
///
/// Invoked from the transformer, synchronously on a runtime worker. Keep
/// calls short or hand them to a dedicated thread.
pub trait HashTimestamper: Send + Sync {
    /// Network identifier, used as the evidence provider.
    fn network(&self) -> String;

    fn timestamp_hash(&self, hash: &Digest) -> std::result::Result<TransactionId, TransformError>;
}

/// Offline timestamper: the transaction id is SHA-256 of the hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyTimestamper;

impl HashTimestamper for DummyTimestamper {
    fn network(&self) -> String {
        "dummy".to_string()
    }

    fn timestamp_hash(&self, hash: &Digest) -> std::result::Result<TransactionId, TransformError> {
        Ok(TransactionId(Sha256::digest(hash.as_bytes()).to_vec()))
    }
}

/// Rewrites batch evidence into blockchain batch evidence.
pub struct BcBatchTransformer {
    timestamper: Arc<dyn HashTimestamper>,
    last: Mutex<Option<(Digest, TransactionId)>>,
}

impl BcBatchTransformer {
    pub fn new(timestamper: Arc<dyn HashTimestamper>) -> Self {
        Self {
            timestamper,
            last: Mutex::new(None),
        }
    }

    /// Transaction id for `root`, broadcasting only when the root changes.
    fn txid_for(&self, root: &Digest) -> std::result::Result<TransactionId, TransformError> {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((seen, txid)) = last.as_ref() {
            if seen == root {
                return Ok(txid.clone());
            }
        }

        let txid = self.timestamper.timestamp_hash(root)?;
        tracing::info!(txid = %txid, root = %root, "Broadcasted transaction");
        *last = Some((*root, txid.clone()));
        Ok(txid)
    }
}

impl Transformer for BcBatchTransformer {
    fn transform(
        &self,
        evidence: Evidence,
        data: &Digest,
        meta: &[u8],
    ) -> std::result::Result<FossilResult, TransformError> {
        let batch = match evidence.proof {
            Proof::Batch(batch) => batch,
            Proof::BcBatch(_) => {
                return Err(TransformError::new("evidence is already a blockchain batch proof"))
            }
        };
        let txid = self.txid_for(&batch.root)?;

        Ok(FossilResult {
            evidence: Evidence {
                backend: NAME.to_string(),
                provider: self.timestamper.network(),
                proof: Proof::BcBatch(BcBatchProof { batch, txid }),
            },
            data: *data,
            meta: meta.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BcBatchInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub commit: String,
    pub blockchain: String,
}

/// A batch fossilizer with a `BcBatchTransformer` installed.
pub struct BcBatchFossilizer {
    inner: Fossilizer,
    timestamper: Arc<dyn HashTimestamper>,
}

impl BcBatchFossilizer {
    pub fn get_info(&self) -> BcBatchInfo {
        let info = self.inner.get_info();
        BcBatchInfo {
            name: NAME.to_string(),
            description: DESCRIPTION.to_string(),
            version: info.version,
            commit: info.commit,
            blockchain: self.timestamper.network(),
        }
    }

    pub fn into_inner(self) -> Fossilizer {
        self.inner
    }
}

impl Deref for BcBatchFossilizer {
    type Target = Fossilizer;

    fn deref(&self) -> &Fossilizer {
        &self.inner
    }
}

pub async fn new_fossilizer(
    config: FossilizerConfig,
    timestamper: Arc<dyn HashTimestamper>,
) -> Result<BcBatchFossilizer> {
    with_metrics(config, timestamper, Arc::new(RecorderMetrics)).await
}

pub async fn with_metrics(
    config: FossilizerConfig,
    timestamper: Arc<dyn HashTimestamper>,
    metrics: Arc<dyn FossilizerMetrics>,
) -> Result<BcBatchFossilizer> {
    if config.max_sim_batches > 1 {
        return Err(FossilizerError::InvalidConfig(format!(
            "max_sim_batches is {}, want less than 2",
            config.max_sim_batches
        )));
    }

    let inner = Fossilizer::with_metrics(config, metrics).await?;
    inner.set_transformer(Some(Arc::new(BcBatchTransformer::new(timestamper.clone()))));

    Ok(BcBatchFossilizer { inner, timestamper })
}
