// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Evidence Emitter
//!
//! Turns a committed tree into one `FossilResult` per leaf and fans it out to
//! every attached channel.
//!
//! # Semantics
//! - One timestamp per batch, shared by all of its leaves.
//! - Leaves are published in leaf order.
//! - A failing transformer drops that leaf only; the rest of the batch proceeds.
//! - Subscribers must drain: publishing waits on full channels. A subscriber
//!   attached mid-batch may miss that batch's earlier leaves.

use crate::errors::TransformError;
use crate::telemetry::FossilizerMetrics;
use fossil_kernel::merkle::StaticTree;
use fossil_kernel::proof::{Evidence, FossilResult};
use fossil_kernel::types::{Digest, Fossil};
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

pub type ResultSender = mpsc::Sender<FossilResult>;

/// Per-leaf conversion of `(evidence, data, meta)` into what subscribers see.
///
/// Called synchronously on a runtime worker thread while the batch holds its
/// pool permit. An implementation that does network I/O (a real
/// `HashTimestamper`) blocks that thread and should run on a multi-thread
/// runtime.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        evidence: Evidence,
        data: &Digest,
        meta: &[u8],
    ) -> Result<FossilResult, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(Evidence, &Digest, &[u8]) -> Result<FossilResult, TransformError> + Send + Sync,
{
    fn transform(
        &self,
        evidence: Evidence,
        data: &Digest,
        meta: &[u8],
    ) -> Result<FossilResult, TransformError> {
        self(evidence, data, meta)
    }
}

/// `{ evidence, data, meta }` unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(
        &self,
        evidence: Evidence,
        data: &Digest,
        meta: &[u8],
    ) -> Result<FossilResult, TransformError> {
        Ok(FossilResult {
            evidence,
            data: *data,
            meta: meta.to_vec(),
        })
    }
}

struct EmitterInner {
    subscribers: RwLock<Vec<ResultSender>>,
    transformer: RwLock<Arc<dyn Transformer>>,
    metrics: Arc<dyn FossilizerMetrics>,
}

#[derive(Clone)]
pub struct EvidenceEmitter {
    inner: Arc<EmitterInner>,
}

impl EvidenceEmitter {
    pub fn new(metrics: Arc<dyn FossilizerMetrics>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                subscribers: RwLock::new(Vec::new()),
                transformer: RwLock::new(Arc::new(IdentityTransformer)),
                metrics,
            }),
        }
    }

    /// Register a consumer. Channels whose receiver is gone are pruned here.
    pub fn attach(&self, tx: ResultSender) {
        let mut subs = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.retain(|s| !s.is_closed());
        subs.push(tx);
    }

    /// Install a transformer; `None` restores identity.
    pub fn set_transformer(&self, transformer: Option<Arc<dyn Transformer>>) {
        let next = transformer.unwrap_or_else(|| Arc::new(IdentityTransformer));
        *self
            .inner
            .transformer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    pub fn subscriber_count(&self) -> usize {
        self.snapshot_subscribers().len()
    }

    fn snapshot_subscribers(&self) -> Vec<ResultSender> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn snapshot_transformer(&self) -> Arc<dyn Transformer> {
        self.inner
            .transformer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Emit evidence for every leaf of `tree`. `fossils` must be the batch the
    /// tree was built from. Returns the number of results published.
    pub async fn emit(&self, tree: &StaticTree, fossils: &[Fossil]) -> usize {
        let ts = chrono::Utc::now().timestamp();
        let root = tree.root();
        let transformer = self.snapshot_transformer();
        let subscribers = self.snapshot_subscribers();

        let mut published = 0;
        for (index, fossil) in fossils.iter().enumerate() {
            let Some(path) = tree.path(index) else {
                tracing::error!(index, leaves = tree.leaves_len(), "Leaf index outside tree");
                break;
            };
            let evidence = Evidence::batch(ts, root, path);

            let result = match transformer.transform(evidence, &fossil.data, &fossil.meta) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(index, root = %root, error = %e, "Transformer failed, dropping leaf");
                    self.inner.metrics.transform_failed();
                    continue;
                }
            };

            publish(&subscribers, result).await;
            published += 1;
        }

        published
    }
}

async fn publish(subscribers: &[ResultSender], result: FossilResult) {
    let sends = subscribers.iter().map(|tx| tx.send(result.clone()));
    for outcome in join_all(sends).await {
        if outcome.is_err() {
            tracing::debug!("Result channel closed, skipping subscriber");
        }
    }
}
