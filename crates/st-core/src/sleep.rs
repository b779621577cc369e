//! Sleep minute computation.
//!
//! Turns activity intervals into sleep minutes by intersecting each
//! inactivity span with every occurrence of the nightly window:
//!
//! 1. Build maximal inactivity spans (see [`build_inactivity_spans`]).
//! 2. For each span, walk the calendar days from the day before its start to
//!    the day after its end and intersect the span with that day's window
//!    occurrence. The intersection happens on naive local timestamps, so a
//!    `23:00-08:00` window is always nine local hours long even on the night
//!    the clocks change.
//! 3. Each intersection contributes `max(0, minutes - threshold)`. The
//!    threshold applies per intersection, not per span or per night.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};

use crate::interval::{ActivityInterval, InactivitySpan, build_inactivity_spans};
use crate::window::NightlyWindow;

/// Configuration for sleep computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepConfig {
    /// The recurring window inactivity must fall in to count.
    pub window: NightlyWindow,
    /// Minimum inactivity inside one window occurrence before any of it
    /// counts. Default: 60 minutes.
    pub threshold: TimeDelta,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            window: NightlyWindow::default(),
            threshold: TimeDelta::minutes(60),
        }
    }
}

/// The part of an inactivity span that falls inside one window occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepIntersection {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
}

impl SleepIntersection {
    /// Length in local calendar minutes, truncated.
    #[must_use]
    pub fn minutes(&self) -> i64 {
        (self.local_end - self.local_start).num_minutes()
    }
}

/// Computes total sleep minutes for a set of activity intervals.
///
/// Intervals do not need to be sorted. Empty or all-active input yields 0.
pub fn compute_sleep_minutes(intervals: &[ActivityInterval], config: &SleepConfig) -> u32 {
    let threshold = config.threshold.num_minutes();
    let total: i64 = build_inactivity_spans(intervals)
        .iter()
        .flat_map(|span| intersect_with_window(span, &config.window))
        .map(|intersection| {
            let minutes = intersection.minutes();
            tracing::trace!(
                start = %intersection.start,
                end = %intersection.end,
                minutes,
                "inactivity inside window"
            );
            (minutes - threshold).max(0)
        })
        .sum();
    tracing::debug!(intervals = intervals.len(), total, "computed sleep minutes");

    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Intersects a span with every window occurrence it could touch.
pub fn intersect_with_window(span: &InactivitySpan, window: &NightlyWindow) -> Vec<SleepIntersection> {
    let span_start = span.start.naive_local();
    let span_end = span.end.naive_local();
    if span_end <= span_start {
        return Vec::new();
    }

    let first_day = span_start.date().pred_opt().unwrap_or(span_start.date());
    let last_day = span_end.date().succ_opt().unwrap_or(span_end.date());

    first_day
        .iter_days()
        .take_while(|day| *day <= last_day)
        .filter_map(|day| {
            let (window_start, window_end) = window.occurrence(day);
            let local_start = span_start.max(window_start);
            let local_end = span_end.min(window_end);
            (local_start < local_end).then(|| SleepIntersection {
                start: reattach_offset(local_start, span),
                end: reattach_offset(local_end, span),
                local_start,
                local_end,
            })
        })
        .collect()
}

/// Re-expresses a local boundary as an absolute instant.
///
/// Boundaries at or before the span start take its offset, boundaries at or
/// after the span end take the end offset. Anything in between takes
/// whichever offset keeps the instant inside the span, trying the offset of
/// the nearer span boundary first.
fn reattach_offset(local: NaiveDateTime, span: &InactivitySpan) -> DateTime<FixedOffset> {
    let start_offset = *span.start.offset();
    let end_offset = *span.end.offset();
    let start_local = span.start.naive_local();
    let end_local = span.end.naive_local();

    if local == start_local {
        return span.start;
    }
    if local == end_local {
        return span.end;
    }
    if local < start_local {
        return with_offset(local, start_offset);
    }
    if local > end_local {
        return with_offset(local, end_offset);
    }

    if start_offset != end_offset {
        let candidates = if end_local - local < local - start_local {
            [end_offset, start_offset]
        } else {
            [start_offset, end_offset]
        };
        for offset in candidates {
            let candidate = with_offset(local, offset);
            if span.start <= candidate && candidate <= span.end {
                return candidate;
            }
        }
    }

    with_offset(local, start_offset)
}

fn with_offset(local: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}
