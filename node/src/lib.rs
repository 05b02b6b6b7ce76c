// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod journal;
pub mod batch;
pub mod emitter;
pub mod pool;
pub mod scheduler;
pub mod recovery;
pub mod fossilizer;
pub mod bcbatch;

pub use config::FossilizerConfig;
pub use emitter::{IdentityTransformer, Transformer};
pub use errors::{FossilizerError, TransformError};
pub use fossilizer::{Fossilizer, FossilizerInfo};
pub use telemetry::{FossilizerMetrics, NoopMetrics, RecorderMetrics};
