// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics recorder). Call once from a binary.
pub fn init_telemetry() {
    // 1. Tracing
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fossil_node=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    // 2. Prometheus recorder
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::warn!("Failed to install Prometheus recorder: {}", e),
    }

    metrics::describe_counter!("fossil_batches_total", "Number of batches sent to the committer");
    metrics::describe_counter!("fossil_leaves_fossilized_total", "Number of fossils committed under a root");
    metrics::describe_histogram!("fossil_batch_commit_seconds", "Time to build, emit and finalize a batch");
    metrics::describe_counter!("fossil_transform_failures_total", "Leaves dropped by a failing transformer");
    metrics::describe_counter!("fossil_recovered_total", "Fossils replayed from pending journals");
}

/// Render the Prometheus exposition text.
pub fn render_metrics() -> String {
    match PROM_HANDLE.get() {
        Some(handle) => handle.render(),
        None => "# metrics not initialized".to_string(),
    }
}

/// Observability port injected into the fossilizer.
pub trait FossilizerMetrics: Send + Sync {
    fn batch_started(&self, leaves: usize);
    fn leaves_fossilized(&self, count: usize);
    fn batch_committed(&self, elapsed: Duration);
    fn transform_failed(&self);
    fn recovered_fossils(&self, count: usize);
}

/// Forwards to whatever `metrics` recorder is installed (none: no-op).
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl FossilizerMetrics for RecorderMetrics {
    fn batch_started(&self, _leaves: usize) {
        metrics::counter!("fossil_batches_total", 1);
    }

    fn leaves_fossilized(&self, count: usize) {
        metrics::counter!("fossil_leaves_fossilized_total", count as u64);
    }

    fn batch_committed(&self, elapsed: Duration) {
        metrics::histogram!("fossil_batch_commit_seconds", elapsed.as_secs_f64());
    }

    fn transform_failed(&self) {
        metrics::counter!("fossil_transform_failures_total", 1);
    }

    fn recovered_fossils(&self, count: usize) {
        metrics::counter!("fossil_recovered_total", count as u64);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl FossilizerMetrics for NoopMetrics {
    fn batch_started(&self, _leaves: usize) {}
    fn leaves_fossilized(&self, _count: usize) {}
    fn batch_committed(&self, _elapsed: Duration) {}
    fn transform_failed(&self) {}
    fn recovered_fossils(&self, _count: usize) {}
}
