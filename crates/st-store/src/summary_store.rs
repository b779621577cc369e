//! Daily summaries stored as a single `summary.json` keyed by date.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use st_core::DailySummary;

use crate::StoreError;
use crate::retry::{with_retry, write_atomic};

type SummaryMap = BTreeMap<NaiveDate, DailySummary>;

/// Summary store backed by one JSON document.
///
/// Every mutation is a read-modify-write of the whole document under an
/// in-process lock, finished with an atomic rename. An unparsable document
/// is renamed to `summary.json.corrupt-<micros>` and the store starts over
/// from empty.
#[derive(Debug)]
pub struct SummaryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All summaries, oldest first.
    pub fn all(&self) -> Result<Vec<DailySummary>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_values().collect())
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(&date))
    }

    /// Inserts or replaces the summary for its date.
    pub fn upsert(&self, summary: DailySummary) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        map.insert(summary.date, summary);
        self.save(&map)
    }

    /// Applies `apply` to the summary for `date`, creating an empty one if
    /// needed, and returns the stored result.
    pub fn update<F>(&self, date: NaiveDate, apply: F) -> Result<DailySummary, StoreError>
    where
        F: FnOnce(&mut DailySummary),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        let summary = map
            .entry(date)
            .or_insert_with(|| DailySummary::empty(date));
        apply(summary);
        let updated = summary.clone();
        self.save(&map)?;
        Ok(updated)
    }

    fn load(&self) -> Result<SummaryMap, StoreError> {
        let content = match with_retry("read summaries", || std::fs::read_to_string(&self.path)) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SummaryMap::new()),
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };

        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(err) => {
                let aside = self.quarantine()?;
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %err,
                    "summary file is corrupted, starting from empty"
                );
                Ok(SummaryMap::new())
            }
        }
    }

    /// Moves an unparsable document out of the way so the next save cannot
    /// destroy it.
    fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().timestamp_micros()));
        let aside = self.path.with_file_name(name);
        with_retry("quarantine summaries", || std::fs::rename(&self.path, &aside))
            .map_err(|err| StoreError::io(&self.path, err))?;
        Ok(aside)
    }

    fn save(&self, map: &SummaryMap) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(map).map_err(|err| StoreError::json(&self.path, err))?;
        write_atomic(&self.path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn store() -> (tempfile::TempDir, SummaryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::new(dir.path().join("summary.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.all().unwrap().is_empty());
        assert!(store.get(date("2024-06-02")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_by_date() {
        let (_dir, store) = store();
        let mut summary = DailySummary::empty(date("2024-06-02"));
        summary.total_sleep_minutes = 100;
        store.upsert(summary.clone()).unwrap();

        summary.total_sleep_minutes = 420;
        store.upsert(summary).unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_sleep_minutes, 420);
    }

    #[test]
    fn test_update_creates_and_accumulates() {
        let (_dir, store) = store();
        store
            .update(date("2024-06-02"), |s| s.record_sample(false, 0.5, 2))
            .unwrap();
        let updated = store
            .update(date("2024-06-02"), |s| s.record_sample(false, 0.5, 3))
            .unwrap();

        assert_eq!(updated.sample_count, 2);
        assert_eq!(updated.total_sleep_minutes, 5);
        assert_eq!(store.get(date("2024-06-02")).unwrap(), Some(updated));
    }

    #[test]
    fn test_all_is_ordered_by_date() {
        let (_dir, store) = store();
        store.upsert(DailySummary::empty(date("2024-06-03"))).unwrap();
        store.upsert(DailySummary::empty(date("2024-06-01"))).unwrap();

        let dates: Vec<_> = store.all().unwrap().iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date("2024-06-01"), date("2024-06-03")]);
    }

    #[test]
    fn test_corrupted_file_is_set_aside_before_rebuild() {
        let (dir, store) = store();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(store.all().unwrap().is_empty());

        store.upsert(DailySummary::empty(date("2024-06-02"))).unwrap();
        assert_eq!(store.all().unwrap().len(), 1);

        let aside: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("summary.json.corrupt-")
            })
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(std::fs::read_to_string(aside[0].path()).unwrap(), "{ not json");
    }
}
