//! Activity intervals and inactivity spans.

use chrono::{DateTime, FixedOffset};

/// A stretch of time with a single activity classification.
///
/// Intervals are derived from consecutive samples and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityInterval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub was_active: bool,
}

impl ActivityInterval {
    #[must_use]
    pub const fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>, was_active: bool) -> Self {
        Self {
            start,
            end,
            was_active,
        }
    }

    #[must_use]
    pub const fn active(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self::new(start, end, true)
    }

    #[must_use]
    pub const fn inactive(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self::new(start, end, false)
    }
}

/// A maximal run of inactivity.
///
/// Both ends keep the UTC offset they were observed with, which is what
/// lets the sleep engine work in local calendar time across DST changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivitySpan {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// Merges inactive intervals into maximal spans.
///
/// Intervals are visited in start order. Each inactive interval opens a span
/// or extends the open one; each active interval closes it. A span still
/// open at the end of input is closed there.
pub fn build_inactivity_spans(intervals: &[ActivityInterval]) -> Vec<InactivitySpan> {
    let mut ordered: Vec<&ActivityInterval> = intervals.iter().collect();
    ordered.sort_by_key(|interval| interval.start);

    let mut spans = Vec::new();
    let mut current: Option<InactivitySpan> = None;

    for interval in ordered {
        if interval.was_active {
            if let Some(span) = current.take() {
                spans.push(span);
            }
            continue;
        }

        match current.as_mut() {
            Some(span) => {
                if interval.end > span.end {
                    span.end = interval.end;
                }
            }
            None => {
                current = Some(InactivitySpan {
                    start: interval.start,
                    end: interval.end,
                });
            }
        }
    }

    spans.extend(current);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_empty_input_has_no_spans() {
        assert!(build_inactivity_spans(&[]).is_empty());
    }

    #[test]
    fn test_consecutive_inactive_intervals_merge() {
        let intervals = [
            ActivityInterval::inactive(at("2024-06-01T23:00:00+02:00"), at("2024-06-01T23:30:00+02:00")),
            ActivityInterval::inactive(at("2024-06-01T23:30:00+02:00"), at("2024-06-02T01:00:00+02:00")),
        ];
        let spans = build_inactivity_spans(&intervals);
        assert_eq!(
            spans,
            vec![InactivitySpan {
                start: at("2024-06-01T23:00:00+02:00"),
                end: at("2024-06-02T01:00:00+02:00"),
            }]
        );
    }

    #[test]
    fn test_active_interval_splits_spans() {
        let intervals = [
            ActivityInterval::inactive(at("2024-06-01T23:00:00+02:00"), at("2024-06-02T01:00:00+02:00")),
            ActivityInterval::active(at("2024-06-02T01:00:00+02:00"), at("2024-06-02T01:05:00+02:00")),
            ActivityInterval::inactive(at("2024-06-02T01:05:00+02:00"), at("2024-06-02T08:00:00+02:00")),
        ];
        let spans = build_inactivity_spans(&intervals);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].end, at("2024-06-02T01:00:00+02:00"));
        assert_eq!(spans[1].start, at("2024-06-02T01:05:00+02:00"));
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_start() {
        let intervals = [
            ActivityInterval::inactive(at("2024-06-02T01:05:00+02:00"), at("2024-06-02T08:00:00+02:00")),
            ActivityInterval::inactive(at("2024-06-01T23:00:00+02:00"), at("2024-06-02T01:05:00+02:00")),
        ];
        let spans = build_inactivity_spans(&intervals);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, at("2024-06-01T23:00:00+02:00"));
        assert_eq!(spans[0].end, at("2024-06-02T08:00:00+02:00"));
    }

    #[test]
    fn test_all_active_has_no_spans() {
        let intervals = [
            ActivityInterval::active(at("2024-06-01T22:00:00Z"), at("2024-06-01T23:00:00Z")),
            ActivityInterval::active(at("2024-06-01T23:00:00Z"), at("2024-06-02T08:00:00Z")),
        ];
        assert!(build_inactivity_spans(&intervals).is_empty());
    }
}
