//! Append-only raw sample log, one CSV file per local day.
//!
//! Files live at `samples/YYYY-MM-DD.csv` with the header
//! `timestamp,is_active,inactivity_minutes,sleep_minutes_increment`.
//! Readers skip malformed rows, so a torn write from a crash costs one
//! sample, not the day.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use st_core::ActivitySample;

use crate::StoreError;
use crate::retry::with_retry;

const HEADER: &[&str] = &[
    "timestamp",
    "is_active",
    "inactivity_minutes",
    "sleep_minutes_increment",
];

/// One row of the sample log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub is_active: bool,
    pub inactivity_minutes: f64,
    pub sleep_minutes_increment: u32,
}

impl SampleRecord {
    /// Builds a row, rounding idle minutes to two decimals.
    #[must_use]
    pub fn new(sample: &ActivitySample, sleep_minutes_increment: u32) -> Self {
        Self {
            timestamp: sample.timestamp,
            is_active: sample.is_active,
            inactivity_minutes: (sample.idle_minutes * 100.0).round() / 100.0,
            sleep_minutes_increment,
        }
    }

    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

impl From<&SampleRecord> for ActivitySample {
    fn from(record: &SampleRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            is_active: record.is_active,
            idle_minutes: record.inactivity_minutes,
        }
    }
}

/// Per-day CSV sample log.
#[derive(Debug, Clone)]
pub struct SampleLog {
    dir: PathBuf,
}

impl SampleLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Appends one row to the file for the row's local date.
    pub fn append(&self, record: &SampleRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.local_date());
        let mut file = with_retry("open sample log", || open_for_append(&path))
            .map_err(|err| StoreError::io(&path, err))?;

        let needs_header = file
            .metadata()
            .map_err(|err| StoreError::io(&path, err))?
            .len()
            == 0;
        if !needs_header {
            terminate_last_line(&mut file).map_err(|err| StoreError::io(&path, err))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer
                .write_record(HEADER)
                .map_err(|err| StoreError::csv(&path, err))?;
        }
        writer
            .serialize(record)
            .map_err(|err| StoreError::csv(&path, err))?;
        writer.flush().map_err(|err| StoreError::io(&path, err))?;
        Ok(())
    }

    /// Reads every well-formed row for `date`, ordered by timestamp.
    ///
    /// A missing file yields an empty list.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<SampleRecord>, StoreError> {
        let path = self.path_for(date);
        let file = match with_retry("read sample log", || File::open(&path)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&path, err)),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<SampleRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(err) if err.is_io_error() => return Err(StoreError::csv(&path, err)),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        row = index + 1,
                        error = %err,
                        "skipping malformed sample row"
                    );
                }
            }
        }

        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    /// Reads a day's rows as activity samples.
    pub fn read_samples(&self, date: NaiveDate) -> Result<Vec<ActivitySample>, StoreError> {
        Ok(self.read_day(date)?.iter().map(ActivitySample::from).collect())
    }

    /// Dates that have a log file, oldest first.
    pub fn dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.dir, err)),
        };

        let mut dates: Vec<NaiveDate> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".csv")?;
                NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
            })
            .collect();
        dates.sort_unstable();
        Ok(dates)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn open_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
}

/// Adds a newline if a previous write stopped mid-row.
fn terminate_last_line(file: &mut File) -> io::Result<()> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}
