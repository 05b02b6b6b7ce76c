// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Batch Worker Pool
//!
//! Each dispatched batch becomes one task. A semaphore with `max_sim_batches`
//! permits bounds how many tasks are inside the commit stage (Merkle build,
//! evidence emission, journal finalization) at once. The `JoinSet` is the wait
//! group drained on shutdown.

use crate::batch::PendingBatch;
use crate::emitter::EvidenceEmitter;
use crate::errors::FossilizerError;
use crate::journal;
use crate::telemetry::FossilizerMetrics;
use fossil_kernel::merkle::StaticTree;
use fossil_kernel::types::Digest;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};

/// Shared by every batch task.
pub struct CommitContext {
    pub emitter: EvidenceEmitter,
    pub metrics: Arc<dyn FossilizerMetrics>,
    pub archive: bool,
}

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    ctx: Arc<CommitContext>,
    fatal_tx: mpsc::UnboundedSender<FossilizerError>,
}

impl WorkerPool {
    pub fn new(
        max_sim_batches: usize,
        ctx: CommitContext,
        fatal_tx: mpsc::UnboundedSender<FossilizerError>,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_sim_batches)),
            tasks: JoinSet::new(),
            ctx: Arc::new(ctx),
            fatal_tx,
        }
    }

    /// Hand a batch to a new task. Never blocks; the task waits for a permit.
    pub fn spawn(&mut self, batch: PendingBatch) {
        if batch.is_empty() {
            tracing::debug!("Skipping empty batch");
            return;
        }
        let semaphore = self.semaphore.clone();
        let ctx = self.ctx.clone();
        let fatal_tx = self.fatal_tx.clone();
        self.tasks
            .spawn(async move { commit_batch(semaphore, ctx, batch, fatal_tx).await });
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next finished task, `None` when the pool is idle.
    pub async fn join_next(&mut self) -> Option<Result<(), JoinError>> {
        self.tasks.join_next().await
    }

    /// Wait for every task spawned so far.
    pub async fn wait(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            report_join(res);
        }
    }
}

/// Log a task that panicked or was aborted.
pub fn report_join(res: Result<(), JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "Batch task did not complete");
    }
}

async fn commit_batch(
    semaphore: Arc<Semaphore>,
    ctx: Arc<CommitContext>,
    batch: PendingBatch,
    fatal_tx: mpsc::UnboundedSender<FossilizerError>,
) {
    // The semaphore is never closed.
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return;
    };
    let started = Instant::now();

    let (fossils, journal_file) = batch.into_parts();
    ctx.metrics.batch_started(fossils.len());

    let leaves: Vec<Digest> = fossils.iter().map(|f| f.data).collect();
    let tree = match tokio::task::spawn_blocking(move || StaticTree::new(&leaves)).await {
        Ok(Ok(tree)) => tree,
        Ok(Err(e)) => {
            tracing::error!(error = %e, leaves = fossils.len(), "Failed to build Merkle tree");
            let _ = fatal_tx.send(e.into());
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Merkle build task failed");
            let _ = fatal_tx.send(FossilizerError::Worker(e.to_string()));
            return;
        }
    };
    let root = tree.root();

    let published = ctx.emitter.emit(&tree, &fossils).await;

    if let Some(file) = journal_file {
        let dir = file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        journal::finalize(file, &dir, &root, ctx.archive).await;
    }

    ctx.metrics.leaves_fossilized(fossils.len());
    ctx.metrics.batch_committed(started.elapsed());
    tracing::info!(
        root = %root,
        leaves = fossils.len(),
        published,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Batch committed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopMetrics;
    use fossil_kernel::types::Fossil;
    use tempfile::tempdir;

    fn pool(
        max: usize,
        archive: bool,
    ) -> (
        WorkerPool,
        EvidenceEmitter,
        mpsc::UnboundedReceiver<FossilizerError>,
    ) {
        let emitter = EvidenceEmitter::new(Arc::new(NoopMetrics));
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let ctx = CommitContext {
            emitter: emitter.clone(),
            metrics: Arc::new(NoopMetrics),
            archive,
        };
        (WorkerPool::new(max, ctx, fatal_tx), emitter, fatal_rx)
    }

    fn batch_of(tags: &[u8]) -> PendingBatch {
        let mut batch = PendingBatch::default();
        for &t in tags {
            batch.append(Fossil::new(Digest([t; 32]), vec![t]));
        }
        batch
    }

    #[tokio::test]
    async fn test_pool_commits_and_waits() {
        let (mut pool, emitter, mut fatal_rx) = pool(2, true);
        let (tx, mut rx) = mpsc::channel(32);
        emitter.attach(tx);

        pool.spawn(batch_of(&[1, 2, 3]));
        pool.spawn(batch_of(&[4, 5]));
        assert_eq!(pool.in_flight(), 2);
        pool.wait().await;
        assert!(pool.is_idle());

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 5);
        assert!(fatal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pool_skips_empty_batch() {
        let (mut pool, _emitter, _fatal_rx) = pool(1, true);
        pool.spawn(PendingBatch::default());
        assert!(pool.is_idle());
    }

    #[tokio::test]
    async fn test_pool_archives_journal_under_root() {
        let dir = tempdir().unwrap();
        let (mut pool, _emitter, _fatal_rx) = pool(1, true);

        let mut batch = PendingBatch::default();
        let journal_path = journal::new_pending_path(dir.path());
        batch.open_journal(&journal_path, false).unwrap();
        for t in [7u8, 8, 9] {
            let fossil = Fossil::new(Digest([t; 32]), vec![t]);
            batch.write_journal(&fossil).unwrap();
            batch.append(fossil);
        }
        let root = StaticTree::new(&batch.leaves()).unwrap().root();

        pool.spawn(batch);
        pool.wait().await;

        assert!(!journal_path.exists());
        let archived = journal::archive_path(dir.path(), &root);
        let fossils: Vec<Fossil> = journal::open_reader(&archived)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(fossils.len(), 3);
        assert_eq!(fossils[2].meta, vec![9]);
    }

    #[tokio::test]
    async fn test_pool_removes_journal_without_archive() {
        let dir = tempdir().unwrap();
        let (mut pool, _emitter, _fatal_rx) = pool(1, false);

        let mut batch = PendingBatch::default();
        let journal_path = journal::new_pending_path(dir.path());
        batch.open_journal(&journal_path, false).unwrap();
        let fossil = Fossil::new(Digest([1; 32]), Vec::new());
        batch.write_journal(&fossil).unwrap();
        batch.append(fossil);

        pool.spawn(batch);
        pool.wait().await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
