// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pending Journal Files
//!
//! One append-only file per pending batch, so a crash before the batch
//! commits loses nothing.
//!
//! # File Policy
//! - Pending: `<dir>/<unix_nanos>.pending`, created exclusively (mode 0600).
//! - Archived: `<dir>/<lowercase_hex(root)>`, no extension.
//! - Directory: created with mode 0700.
//!
//! # Guarantees
//! - A record is flushed to the OS before `append` returns; with `fsync` it
//!   is also on stable storage.
//! - Exclusive create: two writers can never share a journal.
//! - An existing archive is never overwritten.

use crate::errors::{FossilizerError, Result};
use fossil_kernel::codec::{encode_fossil, FossilDecoder};
use fossil_kernel::types::{Digest, Fossil};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

pub const PENDING_EXT: &str = "pending";
pub const FILE_MODE: u32 = 0o600;
pub const DIR_MODE: u32 = 0o700;

/// Create the journal directory (and parents) if missing.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}

fn unix_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock nanos, strictly increasing within this process.
fn next_stamp() -> i64 {
    let now = unix_nanos();
    let prev = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    now.max(prev + 1)
}

/// A fresh pending journal path inside `dir`.
pub fn new_pending_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.{}", next_stamp(), PENDING_EXT))
}

pub fn is_pending(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(PENDING_EXT) && path.is_file()
}

/// Pending journals in `dir`, ordered by name (creation time).
pub fn list_pending(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_pending(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

pub fn archive_path(dir: &Path, root: &Digest) -> PathBuf {
    dir.join(root.to_hex())
}

/// Append-only writer for one pending batch.
#[derive(Debug)]
pub struct JournalWriter {
    path: PathBuf,
    file: BufWriter<File>,
    records: u64,
    fsync: bool,
}

impl JournalWriter {
    /// Create `path`. Fails if anything already exists there.
    pub fn create(path: impl AsRef<Path>, fsync: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let file = options.open(&path)?;

        tracing::debug!(path = ?path, "Opened pending journal");

        Ok(Self {
            path,
            file: BufWriter::new(file),
            records: 0,
            fsync,
        })
    }

    /// Append one fossil record.
    pub fn append(&mut self, fossil: &Fossil) -> Result<()> {
        let frame = encode_fossil(fossil)?;
        self.file.write_all(&frame)?;
        self.file.flush()?;
        if self.fsync {
            self.file.get_ref().sync_data()?;
        }
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, handing back the path for the batch's owner.
    pub fn close(mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        if self.fsync {
            self.file.get_ref().sync_all()?;
        }
        Ok(self.path)
    }
}

/// Decoder over a pending journal opened read-only.
pub fn open_reader(path: &Path) -> Result<FossilDecoder<BufReader<File>>> {
    let file = File::open(path).map_err(FossilizerError::Io)?;
    Ok(FossilDecoder::new(BufReader::new(file)))
}

/// Where a committed journal should be archived: `<hex(root)>`, or
/// `<hex(root)>.<unix_nanos>` if that name is taken.
pub fn archive_target(dir: &Path, root: &Digest) -> PathBuf {
    let target = archive_path(dir, root);
    if target.exists() {
        let suffixed = dir.join(format!("{}.{}", root.to_hex(), unix_nanos()));
        tracing::warn!(
            existing = ?target,
            fallback = ?suffixed,
            "Archive name already taken, archiving under a suffixed name"
        );
        return suffixed;
    }
    target
}

/// Archive or delete a committed journal. Failures are logged, never returned:
/// evidence for the batch has already been emitted.
pub async fn finalize(journal: PathBuf, dir: &Path, root: &Digest, archive: bool) {
    if archive {
        let target = archive_target(dir, root);
        if let Err(e) = tokio::fs::rename(&journal, &target).await {
            tracing::warn!(from = ?journal, to = ?target, error = %e, "Failed to archive journal");
        } else {
            tracing::debug!(archive = ?target, "Archived journal");
        }
    } else if let Err(e) = tokio::fs::remove_file(&journal).await {
        tracing::warn!(path = ?journal, error = %e, "Failed to remove journal");
    }
}
