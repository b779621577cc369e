//! Activity samples and interval building.
//!
//! Samples are taken on a fixed cadence. Consecutive samples form an
//! interval whose classification is that of the earlier sample.
//!
//! A day's timeline also needs the edges it shares with its neighbours: the
//! stretch between the previous day's last sample and this day's first one,
//! and the stretch after this day's last sample. Those edge intervals are
//! clipped to local midnight so adjacent days never count the same time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::interval::ActivityInterval;

/// A single idle-time observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub timestamp: DateTime<FixedOffset>,
    pub is_active: bool,
    pub idle_minutes: f64,
}

impl ActivitySample {
    /// Local calendar date the sample belongs to.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Builds intervals from consecutive samples.
///
/// Samples are ordered by timestamp first; each interval takes the
/// classification of its earlier sample.
pub fn build_intervals(samples: &[ActivitySample]) -> Vec<ActivityInterval> {
    let mut ordered: Vec<&ActivitySample> = samples.iter().collect();
    ordered.sort_by_key(|sample| sample.timestamp);

    ordered
        .windows(2)
        .map(|pair| ActivityInterval::new(pair[0].timestamp, pair[1].timestamp, pair[0].is_active))
        .collect()
}

/// One day's samples plus the nearest samples on either side of it.
#[derive(Debug, Clone, Copy)]
pub struct DaySamples<'a> {
    pub date: NaiveDate,
    /// Samples for `date`, in any order.
    pub samples: &'a [ActivitySample],
    /// Last sample of the preceding day, if any.
    pub previous: Option<&'a ActivitySample>,
    /// First sample of the following day, if any.
    pub next: Option<&'a ActivitySample>,
}

/// Builds the full interval list for one day, filling the day edges.
///
/// An edge gap longer than `gap_tolerance` becomes an inactive interval.
/// A shorter one is bridged like any consecutive pair.
pub fn build_day_intervals(day: &DaySamples<'_>, gap_tolerance: TimeDelta) -> Vec<ActivityInterval> {
    let mut intervals = build_intervals(day.samples);

    let first = day.samples.iter().min_by_key(|sample| sample.timestamp);
    let last = day.samples.iter().max_by_key(|sample| sample.timestamp);

    if let (Some(previous), Some(first)) = (day.previous, first) {
        let midnight = local_midnight(day.date, *previous.timestamp.offset());
        let start = previous.timestamp.max(midnight);
        if start < first.timestamp {
            let gap = first.timestamp - previous.timestamp;
            let was_active = gap <= gap_tolerance && previous.is_active;
            tracing::trace!(%start, end = %first.timestamp, was_active, "filled leading edge");
            intervals.insert(0, ActivityInterval::new(start, first.timestamp, was_active));
        }
    }

    if let (Some(last), Some(next)) = (last, day.next) {
        let next_day = day.date.succ_opt().unwrap_or(day.date);
        let midnight = local_midnight(next_day, *last.timestamp.offset());
        let end = next.timestamp.min(midnight);
        if last.timestamp < end {
            let gap = next.timestamp - last.timestamp;
            let was_active = gap <= gap_tolerance && last.is_active;
            tracing::trace!(start = %last.timestamp, %end, was_active, "filled trailing edge");
            intervals.push(ActivityInterval::new(last.timestamp, end, was_active));
        }
    }

    intervals
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}
