// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Crash Recovery
//!
//! Replays pending journals left behind by a previous process:
//! - Each `*.pending` file is decoded in full before anything is resubmitted.
//!   A malformed or truncated tail fails startup rather than dropping fossils.
//! - Fossils go back through the scheduler's normal submit path, so they land
//!   in the fresh pending batch (and its fresh journal) like live traffic.
//! - Batches dispatched during a file's replay commit before the file is
//!   deleted and the next one is read.
//!
//! Recovery runs inside the constructor, before any event channel can be
//! attached. A replayed journal that fills a whole batch (for example one
//! dispatched but not yet archived at crash time) is committed and archived
//! here, and its evidence reaches no subscriber.

use crate::errors::{FossilizerError, Result};
use crate::journal;
use crate::scheduler::Scheduler;
use crate::telemetry::FossilizerMetrics;
use fossil_kernel::types::Fossil;
use std::path::Path;

/// Decode every fossil of one journal. Fails on anything but a clean end.
pub fn read_journal(path: &Path) -> Result<Vec<Fossil>> {
    let mut decoder = journal::open_reader(path)?;
    let mut fossils = Vec::new();
    while let Some(fossil) = decoder.next_fossil()? {
        fossils.push(fossil);
    }
    Ok(fossils)
}

/// Replay all pending journals in `dir` through `scheduler`. Returns the
/// number of fossils recovered.
pub async fn recover(
    scheduler: &mut Scheduler,
    dir: &Path,
    metrics: &dyn FossilizerMetrics,
) -> Result<usize> {
    let files = journal::list_pending(dir).map_err(|e| FossilizerError::recovery(dir, e))?;
    if files.is_empty() {
        return Ok(0);
    }
    tracing::info!(dir = ?dir, files = files.len(), "Recovering pending journals");

    let mut total = 0;
    for file in files {
        let fossils = read_journal(&file).map_err(|e| FossilizerError::recovery(&file, e))?;
        let count = fossils.len();

        for fossil in fossils {
            scheduler
                .submit(fossil)
                .map_err(|e| FossilizerError::recovery(&file, e))?;
        }

        scheduler.dispatch_queued();
        scheduler.wait_workers().await;
        if let Some(e) = scheduler.take_fatal() {
            return Err(FossilizerError::recovery(&file, e));
        }

        tokio::fs::remove_file(&file)
            .await
            .map_err(|e| FossilizerError::recovery(&file, e))?;

        tracing::info!(path = ?file, fossils = count, "Recovered journal");
        metrics.recovered_fossils(count);
        total += count;
    }

    tracing::info!(fossils = total, pending = scheduler.pending_len(), "Recovery complete");
    Ok(total)
}
