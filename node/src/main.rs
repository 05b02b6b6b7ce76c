// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! `fossil-node`: reads `<hex digest> [meta]` lines from stdin, fossilizes
//! them, and writes one JSON result per committed leaf to stdout.
//!
//! Stops on Ctrl-C or end of input. Configuration comes from `FOSSIL_*`
//! environment variables; `FOSSIL_TIMESTAMPER=dummy` enables the blockchain
//! batch transformer with the offline timestamper.

use fossil_kernel::proof::FossilResult;
use fossil_kernel::types::Digest;
use fossil_node::bcbatch::{self, DummyTimestamper};
use fossil_node::config::FossilizerConfig;
use fossil_node::errors::FossilizerError;
use fossil_node::fossilizer::Fossilizer;
use fossil_node::telemetry::{init_telemetry, render_metrics};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RESULT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() {
    init_telemetry();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "fossil-node failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FossilizerError> {
    let cfg = FossilizerConfig::from_env()?;
    tracing::info!(config = ?cfg, "Initializing fossilizer");

    let fossilizer: Arc<Fossilizer> = match std::env::var("FOSSIL_TIMESTAMPER").ok().as_deref() {
        Some("dummy") => {
            let f = bcbatch::new_fossilizer(cfg, Arc::new(DummyTimestamper)).await?;
            tracing::info!(info = ?f.get_info(), "Blockchain batch fossilizer ready");
            Arc::new(f.into_inner())
        }
        Some(other) => {
            return Err(FossilizerError::InvalidConfig(format!(
                "FOSSIL_TIMESTAMPER: unknown timestamper {:?}",
                other
            )))
        }
        None => {
            let f = Fossilizer::new(cfg).await?;
            tracing::info!(info = ?f.get_info(), "Batch fossilizer ready");
            Arc::new(f)
        }
    };

    let (results_tx, results_rx) = mpsc::channel(RESULT_BUFFER);
    fossilizer.attach_event_channel(results_tx);
    let printer = tokio::spawn(print_results(results_rx));

    let cancel = CancellationToken::new();
    let scheduler = {
        let f = fossilizer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { f.start(cancel).await })
    };
    fossilizer.started().await?;

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            cancel.cancel();
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("End of input, shutting down");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (hex_digest, meta) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match Digest::from_hex(hex_digest) {
            Ok(data) => fossilizer.fossilize(data, meta.trim().as_bytes().to_vec()).await?,
            Err(e) => tracing::warn!(input = %hex_digest, error = %e, "Skipping invalid digest"),
        }
    }

    cancel.cancel();
    let outcome = match scheduler.await {
        Ok(res) => res,
        Err(e) => Err(FossilizerError::Worker(e.to_string())),
    };

    // Dropping the last handle closes the result channel and ends the printer.
    drop(fossilizer);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Result printer failed");
    }
    tracing::debug!(metrics = %render_metrics(), "Final metrics");

    match outcome {
        Err(FossilizerError::Cancelled) | Ok(()) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn print_results(mut rx: mpsc::Receiver<FossilResult>) {
    let stdout = std::io::stdout();
    while let Some(result) = rx.recv().await {
        match serde_json::to_string(&result) {
            Ok(line) => {
                let mut out = stdout.lock();
                if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                    tracing::warn!(error = %e, "Failed to write result");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode result"),
        }
    }
}
