// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Batch Fossilizer
//!
//! Public handle over the scheduler. Construction validates the config,
//! prepares the journal directory and replays leftover journals; `start` then
//! hands the scheduler to the caller's task until the token is cancelled.

use crate::config::FossilizerConfig;
use crate::emitter::{EvidenceEmitter, ResultSender, Transformer};
use crate::errors::{FossilizerError, Result};
use crate::journal;
use crate::pool::{CommitContext, WorkerPool};
use crate::recovery;
use crate::scheduler::{Scheduler, SchedulerEvent};
use crate::telemetry::{FossilizerMetrics, RecorderMetrics};
use fossil_kernel::types::{Digest, Fossil};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "batch";
pub const DESCRIPTION: &str = "Batch Fossilizer";

const MAILBOX_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FossilizerInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub commit: String,
}

type Parked = (Scheduler, mpsc::Receiver<SchedulerEvent>);

pub struct Fossilizer {
    config: FossilizerConfig,
    mailbox: mpsc::Sender<SchedulerEvent>,
    emitter: EvidenceEmitter,
    parked: Mutex<Option<Parked>>,
}

impl Fossilizer {
    /// Build a fossilizer reporting to the installed `metrics` recorder.
    pub async fn new(config: FossilizerConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(RecorderMetrics)).await
    }

    pub async fn with_metrics(
        config: FossilizerConfig,
        metrics: Arc<dyn FossilizerMetrics>,
    ) -> Result<Self> {
        config.validate()?;

        let emitter = EvidenceEmitter::new(metrics.clone());
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::new(
            config.max_sim_batches,
            CommitContext {
                emitter: emitter.clone(),
                metrics: metrics.clone(),
                archive: config.archive,
            },
            fatal_tx,
        );
        let mut scheduler = Scheduler::new(&config, pool, fatal_rx);

        if let Some(dir) = &config.path {
            journal::ensure_dir(dir)?;
            recovery::recover(&mut scheduler, dir, metrics.as_ref()).await?;
        }

        let (mailbox, inbox) = mpsc::channel(MAILBOX_CAPACITY);

        Ok(Self {
            config,
            mailbox,
            emitter,
            parked: Mutex::new(Some((scheduler, inbox))),
        })
    }

    /// Run the scheduler until `cancel` fires or a batch fails fatally.
    /// Returns `Cancelled` on a normal stop; a second call returns `Stopped`.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let parked = self
            .parked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some((scheduler, inbox)) = parked else {
            return Err(FossilizerError::Stopped);
        };
        scheduler.run(inbox, cancel).await
    }

    /// Resolves once the scheduler loop is processing events.
    pub async fn started(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(SchedulerEvent::Started { reply })
            .await
            .map_err(|_| FossilizerError::Stopped)?;
        rx.await.map_err(|_| FossilizerError::Stopped)
    }

    /// Submit one fossil. Returns once it is journaled (and synced, if
    /// configured) and appended to the pending batch.
    pub async fn fossilize(&self, data: Digest, meta: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let fossil = Fossil::new(data, meta);
        self.mailbox
            .send(SchedulerEvent::Submit { fossil, reply })
            .await
            .map_err(|_| FossilizerError::Stopped)?;
        rx.await.map_err(|_| FossilizerError::Stopped)?
    }

    /// Receive a `FossilResult` for every committed leaf from now on.
    /// The receiver must keep draining; committing waits on a full channel.
    pub fn attach_event_channel(&self, tx: ResultSender) {
        self.emitter.attach(tx);
    }

    /// Install a per-leaf transformer. `None` restores identity.
    pub fn set_transformer(&self, transformer: Option<Arc<dyn Transformer>>) {
        self.emitter.set_transformer(transformer);
    }

    pub fn get_info(&self) -> FossilizerInfo {
        FossilizerInfo {
            name: NAME.to_string(),
            description: DESCRIPTION.to_string(),
            version: self.config.version.clone(),
            commit: self.config.commit.clone(),
        }
    }

    pub fn config(&self) -> &FossilizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NoopMetrics;
    use std::time::Duration;

    async fn fossilizer(config: FossilizerConfig) -> Arc<Fossilizer> {
        Arc::new(
            Fossilizer::with_metrics(config, Arc::new(NoopMetrics))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_get_info() {
        let f = fossilizer(FossilizerConfig {
            commit: "abc123".into(),
            ..Default::default()
        })
        .await;
        let info = f.get_info();
        assert_eq!(info.name, "batch");
        assert_eq!(info.description, "Batch Fossilizer");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.commit, "abc123");
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let res = Fossilizer::with_metrics(
            FossilizerConfig {
                max_leaves: 0,
                ..Default::default()
            },
            Arc::new(NoopMetrics),
        )
        .await;
        assert!(matches!(res, Err(FossilizerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_twice_and_submit_after_stop() {
        let f = fossilizer(FossilizerConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        })
        .await;

        let cancel = CancellationToken::new();
        let runner = {
            let f = f.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { f.start(cancel).await })
        };
        f.started().await.unwrap();
        f.fossilize(Digest([1; 32]), b"one".to_vec()).await.unwrap();

        assert!(matches!(
            f.start(CancellationToken::new()).await,
            Err(FossilizerError::Stopped)
        ));

        cancel.cancel();
        let res = runner.await.unwrap();
        assert!(matches!(res, Err(FossilizerError::Cancelled)));

        assert!(matches!(
            f.fossilize(Digest([2; 32]), Vec::new()).await,
            Err(FossilizerError::Stopped)
        ));
    }
}
