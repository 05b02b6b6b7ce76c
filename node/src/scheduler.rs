// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Scheduler
//!
//! The single task that owns the pending batch. Everything that touches the
//! current batch or its journal happens here, so none of it needs a lock:
//!
//! - client submissions and readiness queries arrive on the mailbox;
//! - rotated batches come back on the batch channel and go to the pool;
//! - the interval timer rotates a non-empty pending batch;
//! - workers report fatal commit errors, which end the loop.
//!
//! On exit the scheduler hands queued batches to the pool, optionally commits
//! the pending batch, waits for every worker and closes the open journal.

use crate::batch::PendingBatch;
use crate::config::FossilizerConfig;
use crate::errors::{FossilizerError, Result};
use crate::journal;
use crate::pool::{report_join, WorkerPool};
use fossil_kernel::types::Fossil;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on the up-front allocation for a pending batch.
const PREALLOC_LEAVES: usize = 1024;

pub enum SchedulerEvent {
    Submit {
        fossil: Fossil,
        reply: oneshot::Sender<Result<()>>,
    },
    Started {
        reply: oneshot::Sender<()>,
    },
}

pub struct Scheduler {
    interval: Duration,
    max_leaves: usize,
    path: Option<PathBuf>,
    fsync: bool,
    stop_batch: bool,

    pending: PendingBatch,
    batch_tx: mpsc::UnboundedSender<PendingBatch>,
    batch_rx: mpsc::UnboundedReceiver<PendingBatch>,
    fatal_rx: mpsc::UnboundedReceiver<FossilizerError>,
    pool: WorkerPool,
}

impl Scheduler {
    pub fn new(
        config: &FossilizerConfig,
        pool: WorkerPool,
        fatal_rx: mpsc::UnboundedReceiver<FossilizerError>,
    ) -> Self {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        Self {
            interval: config.interval,
            max_leaves: config.max_leaves,
            path: config.path.clone(),
            fsync: config.fsync,
            stop_batch: config.stop_batch,
            pending: Self::fresh_batch(config.max_leaves),
            batch_tx,
            batch_rx,
            fatal_rx,
            pool,
        }
    }

    fn fresh_batch(max_leaves: usize) -> PendingBatch {
        PendingBatch::with_capacity(max_leaves.min(PREALLOC_LEAVES))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Journal (when configured) then append one fossil, rotating when the
    /// batch reaches `max_leaves`. An error leaves the fossil out of the
    /// in-memory batch; whatever reached the journal is reconciled by the
    /// next recovery.
    pub fn submit(&mut self, fossil: Fossil) -> Result<()> {
        if let Some(dir) = &self.path {
            if !self.pending.has_journal() {
                let file = journal::new_pending_path(dir);
                self.pending.open_journal(&file, self.fsync)?;
                tracing::debug!(path = ?file, "Opened journal for pending batch");
            }
            self.pending.write_journal(&fossil)?;
        }

        self.pending.append(fossil);
        if self.pending.len() >= self.max_leaves {
            self.rotate_and_dispatch();
        }
        Ok(())
    }

    /// Swap in a fresh pending batch and queue the old one for the pool.
    fn rotate_and_dispatch(&mut self) {
        let mut batch = std::mem::replace(&mut self.pending, Self::fresh_batch(self.max_leaves));
        if let Err(e) = batch.close_journal() {
            tracing::warn!(path = ?batch.journal_path(), error = %e, "Failed to close journal on rotation");
        }
        tracing::debug!(leaves = batch.len(), "Dispatching batch");
        if self.batch_tx.send(batch).is_err() {
            tracing::error!("Batch channel closed, batch dropped");
        }
    }

    /// Move every queued batch into the pool.
    pub fn dispatch_queued(&mut self) {
        while let Ok(batch) = self.batch_rx.try_recv() {
            self.pool.spawn(batch);
        }
    }

    /// Wait for every batch handed to the pool so far.
    pub async fn wait_workers(&mut self) {
        self.pool.wait().await;
    }

    /// A fatal error reported by a worker, if any.
    pub fn take_fatal(&mut self) -> Option<FossilizerError> {
        self.fatal_rx.try_recv().ok()
    }

    /// Run until cancelled or a worker reports a fatal error. Always returns
    /// the cause; `Cancelled` is the normal outcome.
    pub async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<SchedulerEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let interval = self.interval;
        let timer = tokio::time::sleep(interval);
        tokio::pin!(timer);

        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            max_leaves = self.max_leaves,
            pending = self.pending.len(),
            "Scheduler started"
        );

        let cause = loop {
            tokio::select! {
                _ = cancel.cancelled() => break FossilizerError::Cancelled,

                Some(err) = self.fatal_rx.recv() => break err,

                event = mailbox.recv() => match event {
                    Some(SchedulerEvent::Submit { fossil, reply }) => {
                        let res = self.submit(fossil);
                        if let Err(e) = &res {
                            tracing::warn!(error = %e, "Submission failed");
                        }
                        let _ = reply.send(res);
                    }
                    Some(SchedulerEvent::Started { reply }) => {
                        let _ = reply.send(());
                    }
                    None => break FossilizerError::Stopped,
                },

                Some(batch) = self.batch_rx.recv() => {
                    timer.as_mut().reset(Instant::now() + interval);
                    self.pool.spawn(batch);
                }

                _ = &mut timer => {
                    timer.as_mut().reset(Instant::now() + interval);
                    if !self.pending.is_empty() {
                        self.rotate_and_dispatch();
                    }
                }

                Some(res) = self.pool.join_next() => report_join(res),
            }
        };

        self.shutdown(cause).await
    }

    async fn shutdown(mut self, cause: FossilizerError) -> Result<()> {
        tracing::info!(
            cause = %cause,
            pending = self.pending.len(),
            stop_batch = self.stop_batch,
            "Scheduler stopping"
        );

        self.dispatch_queued();

        if self.stop_batch && !self.pending.is_empty() {
            let mut batch =
                std::mem::replace(&mut self.pending, Self::fresh_batch(self.max_leaves));
            if let Err(e) = batch.close_journal() {
                tracing::warn!(error = %e, "Failed to close journal of final batch");
            }
            self.pool.spawn(batch);
        }

        self.pool.wait().await;

        if let Err(e) = self.pending.close_journal() {
            tracing::warn!(path = ?self.pending.journal_path(), error = %e, "Failed to close pending journal");
        }

        tracing::info!(left_pending = self.pending.len(), "Scheduler stopped");
        Err(cause)
    }
}
