//! Durable FIFO upload queue.
//!
//! Each pending upload is one file under `queue/` named
//! `{unix_micros:020}_{yyyy-MM-dd}.json`. The zero-padded creation time makes
//! lexicographic order equal to creation order, so the oldest record is
//! simply the smallest name. Records are written to a temp file and renamed
//! into place without replacing anything, so a reader never sees a partial
//! record.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use st_core::QueuedUpload;

use crate::StoreError;
use crate::retry::{with_retry, write_new};

const EXTENSION: &str = ".json";
const MICROS_WIDTH: usize = 20;

/// Identity of a queued record; also its file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(String);

impl QueueId {
    fn from_parts(created_micros: i64, date: NaiveDate) -> Self {
        Self(format!(
            "{:0width$}_{}",
            created_micros.max(0),
            date.format("%Y-%m-%d"),
            width = MICROS_WIDTH
        ))
    }

    /// Parses and validates an identity string.
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidQueueId(value.to_string());
        let (micros, date) = value.split_once('_').ok_or_else(invalid)?;
        if micros.len() != MICROS_WIDTH || !micros.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?;
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// When the record was enqueued.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.created_micros()?)
    }

    fn created_micros(&self) -> Option<i64> {
        self.0.get(..MICROS_WIDTH)?.parse().ok()
    }

    /// The summary date the record is for.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        let date = self.0.get(MICROS_WIDTH + 1..)?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    fn file_name(&self) -> String {
        format!("{}{EXTENSION}", self.0)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk upload queue.
///
/// Safe to share between a producer and a consumer: enqueues never replace
/// files, reads of vanished records return `None`, and deleting a missing
/// record succeeds.
#[derive(Debug)]
pub struct UploadQueue {
    dir: PathBuf,
    last_micros: AtomicI64,
}

impl UploadQueue {
    /// Opens the queue in `dir`, continuing after the newest identity
    /// already on disk.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let queue = Self {
            dir: dir.into(),
            last_micros: AtomicI64::new(0),
        };
        let newest = queue
            .list()
            .ok()
            .and_then(|ids| ids.last().and_then(QueueId::created_micros));
        if let Some(micros) = newest {
            queue.last_micros.store(micros, Ordering::Relaxed);
        }
        queue
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Adds a record and returns its identity.
    pub fn enqueue(&self, record: &QueuedUpload) -> Result<QueueId, StoreError> {
        self.enqueue_at(record, Utc::now())
    }

    /// Adds a record as if enqueued at `now`.
    ///
    /// Identities issued by one queue are strictly increasing even when the
    /// clock stalls or steps back.
    pub fn enqueue_at(&self, record: &QueuedUpload, now: DateTime<Utc>) -> Result<QueueId, StoreError> {
        let id = QueueId::from_parts(self.next_micros(now.timestamp_micros()), record.date);
        let path = self.path_for(&id);
        let json = serde_json::to_vec_pretty(record).map_err(|err| StoreError::json(&path, err))?;
        write_new(&path, &json)?;
        tracing::debug!(id = %id, date = %record.date, "enqueued upload");
        Ok(id)
    }

    fn next_micros(&self, now: i64) -> i64 {
        let mut current = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self
                .last_micros
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// All pending identities, oldest first.
    pub fn list(&self) -> Result<Vec<QueueId>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.dir, err)),
        };

        let mut ids: Vec<QueueId> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                if name.starts_with('.') {
                    return None;
                }
                let stem = name.strip_suffix(EXTENSION)?;
                match QueueId::parse(stem) {
                    Ok(id) => Some(id),
                    Err(_) => {
                        tracing::debug!(file = name, "ignoring foreign file in queue directory");
                        None
                    }
                }
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// The oldest pending identity, if any.
    pub fn peek_oldest(&self) -> Result<Option<QueueId>, StoreError> {
        Ok(self.list()?.into_iter().next())
    }

    /// Reads a record. `None` means it is gone or could not be decoded.
    pub fn read(&self, id: &QueueId) -> Option<QueuedUpload> {
        let path = self.path_for(id);
        let content = match with_retry("read queue record", || std::fs::read(&path)) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "failed to read queued upload");
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "queued upload is corrupted");
                None
            }
        }
    }

    /// Removes a record. Removing a missing record succeeds.
    pub fn delete(&self, id: &QueueId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        match with_retry("delete queue record", || std::fs::remove_file(&path)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }

    /// Deletes records enqueued more than `days` before `now`.
    ///
    /// Returns how many records were removed.
    pub fn purge_older_than(&self, days: u32, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = now - TimeDelta::days(i64::from(days));
        let mut purged = 0;
        for id in self.list()? {
            if id.created_at().is_some_and(|created| created < cutoff) {
                self.delete(&id)?;
                tracing::info!(id = %id, "purged expired upload");
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Number of pending records. Advisory; errors count as zero.
    pub fn pending_count(&self) -> usize {
        self.list().map_or(0, |ids| ids.len())
    }

    fn path_for(&self, id: &QueueId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}
