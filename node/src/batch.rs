// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pending Batch
//!
//! The accumulating buffer of fossils plus, when journaling, the open journal
//! that backs it.
//!
//! # Invariants
//! - Insertion order is leaf order, end to end.
//! - A journal exists iff at least one fossil was journaled into this batch.
//! - Only the scheduler mutates a pending batch; once dispatched it belongs
//!   to exactly one worker.

use crate::errors::Result;
use crate::journal::JournalWriter;
use fossil_kernel::types::{Digest, Fossil};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct PendingBatch {
    fossils: Vec<Fossil>,
    journal: Option<JournalWriter>,
    closed_journal: Option<PathBuf>,
}

impl PendingBatch {
    pub fn with_capacity(max_leaves: usize) -> Self {
        Self {
            fossils: Vec::with_capacity(max_leaves),
            journal: None,
            closed_journal: None,
        }
    }

    pub fn append(&mut self, fossil: Fossil) {
        self.fossils.push(fossil);
    }

    pub fn len(&self) -> usize {
        self.fossils.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fossils.is_empty()
    }

    pub fn leaves(&self) -> Vec<Digest> {
        self.fossils.iter().map(|f| f.data).collect()
    }

    pub fn has_journal(&self) -> bool {
        self.journal.is_some()
    }

    /// Open the journal for this batch. Fails if `path` already exists.
    pub fn open_journal(&mut self, path: &Path, fsync: bool) -> io::Result<()> {
        self.journal = Some(JournalWriter::create(path, fsync)?);
        Ok(())
    }

    /// Journal one fossil. Must precede `append` of the same fossil.
    pub fn write_journal(&mut self, fossil: &Fossil) -> Result<()> {
        match self.journal.as_mut() {
            Some(journal) => journal.append(fossil),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "pending journal is not open").into()),
        }
    }

    /// Close the journal if open. Idempotent; the path stays available via
    /// `journal_path` for whoever finalizes the batch.
    pub fn close_journal(&mut self) -> io::Result<()> {
        if let Some(journal) = self.journal.take() {
            self.closed_journal = Some(journal.path().to_path_buf());
            journal.close()?;
        }
        Ok(())
    }

    /// Path of the journal, open or closed.
    pub fn journal_path(&self) -> Option<&Path> {
        self.journal
            .as_ref()
            .map(|j| j.path())
            .or(self.closed_journal.as_deref())
    }

    /// Split into leaves and journal path, closing the journal first. Every
    /// record was flushed on append, so a failing close is only logged.
    pub fn into_parts(mut self) -> (Vec<Fossil>, Option<PathBuf>) {
        if let Err(e) = self.close_journal() {
            tracing::warn!(path = ?self.closed_journal, error = %e, "Failed to close pending journal");
        }
        (self.fossils, self.closed_journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fossil(tag: u8) -> Fossil {
        Fossil::new(Digest([tag; 32]), format!("meta {}", tag))
    }

    #[test]
    fn test_batch_append_preserves_order() {
        let mut batch = PendingBatch::with_capacity(4);
        assert!(batch.is_empty());
        for i in 0..6 {
            batch.append(fossil(i));
        }
        assert_eq!(batch.len(), 6);
        assert_eq!(batch.leaves(), (0..6).map(|i| Digest([i; 32])).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_journal_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("42.pending");

        let mut batch = PendingBatch::default();
        assert!(batch.write_journal(&fossil(1)).is_err());

        batch.open_journal(&path, false).unwrap();
        assert!(batch.has_journal());
        batch.write_journal(&fossil(1)).unwrap();
        batch.append(fossil(1));

        batch.close_journal().unwrap();
        batch.close_journal().unwrap();
        assert!(!batch.has_journal());
        assert_eq!(batch.journal_path(), Some(path.as_path()));

        let (fossils, journal) = batch.into_parts();
        assert_eq!(fossils.len(), 1);
        assert_eq!(journal, Some(path));
    }

    #[test]
    fn test_batch_open_journal_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("7.pending");
        std::fs::write(&path, b"").unwrap();

        let mut batch = PendingBatch::default();
        assert!(batch.open_journal(&path, false).is_err());
        assert!(!batch.has_journal());
    }
}
