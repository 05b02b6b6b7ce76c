// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::errors::FossilizerError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_LEAVES: usize = 32 * 1024;
pub const DEFAULT_MAX_SIM_BATCHES: usize = 1;
pub const DEFAULT_ARCHIVE: bool = true;
pub const DEFAULT_STOP_BATCH: bool = true;
pub const DEFAULT_FSYNC: bool = false;

#[derive(Debug, Clone)]
pub struct FossilizerConfig {
    /// Reported by `get_info`.
    pub version: String,
    pub commit: String,

    /// Time between batches when the leaf threshold is not reached.
    pub interval: Duration,
    /// Leaf count that forces a batch.
    pub max_leaves: usize,
    /// Batches allowed inside the commit stage at once.
    pub max_sim_batches: usize,
    /// Journal directory. `None` disables journaling: pending fossils are lost on crash.
    pub path: Option<PathBuf>,
    /// Rename a committed journal to its root instead of deleting it.
    pub archive: bool,
    /// Commit whatever is pending on shutdown.
    pub stop_batch: bool,
    /// fsync the journal after every append.
    pub fsync: bool,
}

impl Default for FossilizerConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: String::new(),
            interval: DEFAULT_INTERVAL,
            max_leaves: DEFAULT_MAX_LEAVES,
            max_sim_batches: DEFAULT_MAX_SIM_BATCHES,
            path: None,
            archive: DEFAULT_ARCHIVE,
            stop_batch: DEFAULT_STOP_BATCH,
            fsync: DEFAULT_FSYNC,
        }
    }
}

impl FossilizerConfig {
    pub fn validate(&self) -> Result<(), FossilizerError> {
        if self.interval.is_zero() {
            return Err(FossilizerError::InvalidConfig("interval must be positive".into()));
        }
        if self.max_leaves == 0 {
            return Err(FossilizerError::InvalidConfig("max_leaves must be at least 1".into()));
        }
        if self.max_sim_batches == 0 {
            return Err(FossilizerError::InvalidConfig(
                "max_sim_batches must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overlaid with `FOSSIL_*` environment variables.
    pub fn from_env() -> Result<Self, FossilizerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FossilizerError> {
        let mut cfg = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "FOSSIL_INTERVAL_MS")? {
            cfg.interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, "FOSSIL_MAX_LEAVES")? {
            cfg.max_leaves = n;
        }
        if let Some(n) = parse_var(&lookup, "FOSSIL_MAX_SIM_BATCHES")? {
            cfg.max_sim_batches = n;
        }
        if let Some(p) = lookup("FOSSIL_PATH").filter(|p| !p.is_empty()) {
            cfg.path = Some(PathBuf::from(p));
        }
        if let Some(b) = parse_var(&lookup, "FOSSIL_ARCHIVE")? {
            cfg.archive = b;
        }
        if let Some(b) = parse_var(&lookup, "FOSSIL_STOP_BATCH")? {
            cfg.stop_batch = b;
        }
        if let Some(b) = parse_var(&lookup, "FOSSIL_FSYNC")? {
            cfg.fsync = b;
        }
        if let Some(c) = lookup("FOSSIL_COMMIT") {
            cfg.commit = c;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, FossilizerError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FossilizerError::InvalidConfig(format!("{}: cannot parse {:?}", key, raw))),
    }
}
