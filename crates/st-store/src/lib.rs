//! Storage layer for the sleep tracker.
//!
//! Everything is plain files under one data directory:
//!
//! ```text
//! <root>/
//!   samples/YYYY-MM-DD.csv   raw sample log, append-only
//!   summary.json             daily summaries keyed by date
//!   queue/<id>.json          pending uploads, one file each
//! ```
//!
//! # Durability
//!
//! Documents that get rewritten (`summary.json`, queue records) are written
//! to a temp file in the same directory and renamed into place, so a crash
//! leaves either the old or the new content. The sample log is append-only
//! and its readers skip torn rows. Transient IO failures are retried a few
//! times with jittered backoff before surfacing as [`StoreError::Io`].
//!
//! # Thread Safety
//!
//! [`Storage`] is `Send + Sync` and meant to be shared behind an `Arc`.
//! The summary store serializes its own read-modify-write cycles; the queue
//! relies on no-clobber renames and tolerant reads instead of locks.

mod error;
pub mod queue;
mod retry;
pub mod sample_log;
pub mod summary_store;

use std::path::{Path, PathBuf};

pub use error::StoreError;
pub use queue::{QueueId, UploadQueue};
pub use retry::write_atomic;
pub use sample_log::{SampleLog, SampleRecord};
pub use summary_store::SummaryStore;

/// All persisted state under one data directory.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    samples: SampleLog,
    summaries: SummaryStore,
    queue: UploadQueue,
}

impl Storage {
    /// Opens the data directory, creating its layout if necessary.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let samples_dir = root.join("samples");
        let queue_dir = root.join("queue");
        for dir in [root, samples_dir.as_path(), queue_dir.as_path()] {
            std::fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;
        }

        Ok(Self {
            root: root.to_path_buf(),
            samples: SampleLog::new(samples_dir),
            summaries: SummaryStore::new(root.join("summary.json")),
            queue: UploadQueue::new(queue_dir),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn samples(&self) -> &SampleLog {
        &self.samples
    }

    #[must_use]
    pub const fn summaries(&self) -> &SummaryStore {
        &self.summaries
    }

    #[must_use]
    pub const fn queue(&self) -> &UploadQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("st");
        let storage = Storage::open(&root).unwrap();

        assert!(root.join("samples").is_dir());
        assert!(root.join("queue").is_dir());
        assert_eq!(storage.summaries().path(), root.join("summary.json"));
        assert_eq!(storage.queue().dir(), root.join("queue"));
        assert_eq!(storage.samples().dir(), root.join("samples"));
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        Storage::open(dir.path()).unwrap();
        Storage::open(dir.path()).unwrap();
    }
}
