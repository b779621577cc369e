//! Per-day summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sample::ActivitySample;

/// Totals for one local calendar day.
///
/// A summary starts out as a live estimate built up sample by sample. Once
/// the day is complete it is recomputed from the sample log and marked
/// `finalized`; from then on only recomputation may change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_sleep_minutes: u32,
    pub total_active_minutes: f64,
    pub total_inactive_minutes: f64,
    pub sample_count: u32,
    #[serde(default)]
    pub finalized: bool,
}

impl DailySummary {
    /// An empty, non-finalized summary.
    #[must_use]
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_sleep_minutes: 0,
            total_active_minutes: 0.0,
            total_inactive_minutes: 0.0,
            sample_count: 0,
            finalized: false,
        }
    }

    /// Adds one live sample to the running totals.
    pub fn record_sample(&mut self, is_active: bool, sample_minutes: f64, sleep_increment: u32) {
        self.sample_count = self.sample_count.saturating_add(1);
        self.total_sleep_minutes = self.total_sleep_minutes.saturating_add(sleep_increment);
        if is_active {
            self.total_active_minutes += sample_minutes;
        } else {
            self.total_inactive_minutes += sample_minutes;
        }
    }

    /// Builds the authoritative summary for a completed day.
    ///
    /// Every field is derived from the given inputs, so recomputing over the
    /// same samples always yields the same summary.
    #[must_use]
    pub fn from_samples(
        date: NaiveDate,
        samples: &[ActivitySample],
        sample_minutes: f64,
        total_sleep_minutes: u32,
    ) -> Self {
        let mut summary = Self::empty(date);
        for sample in samples {
            summary.record_sample(sample.is_active, sample_minutes, 0);
        }
        summary.total_sleep_minutes = total_sleep_minutes;
        summary.finalized = true;
        summary
    }

    /// Returns true if any samples were recorded.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}

/// Emitted when a completed day's summary is ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReady {
    pub summary: DailySummary,
    pub date: NaiveDate,
    pub has_data: bool,
}

impl SummaryReady {
    #[must_use]
    pub const fn new(summary: DailySummary) -> Self {
        let date = summary.date;
        let has_data = summary.has_data();
        Self {
            summary,
            date,
            has_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    fn sample(ts: &str, is_active: bool) -> ActivitySample {
        ActivitySample {
            timestamp: DateTime::parse_from_rfc3339(ts).unwrap(),
            is_active,
            idle_minutes: 0.0,
        }
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "sums of halves are exact")]
    fn test_record_sample_is_additive() {
        let mut summary = DailySummary::empty("2024-06-02".parse().unwrap());
        summary.record_sample(true, 0.5, 0);
        summary.record_sample(false, 0.5, 3);
        summary.record_sample(false, 0.5, 2);

        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.total_sleep_minutes, 5);
        assert_eq!(summary.total_active_minutes, 0.5);
        assert_eq!(summary.total_inactive_minutes, 1.0);
        assert!(!summary.finalized);
    }

    #[test]
    fn test_from_samples_is_deterministic() {
        let date = "2024-06-02".parse().unwrap();
        let samples = [
            sample("2024-06-02T01:00:00+02:00", false),
            sample("2024-06-02T01:00:30+02:00", false),
            sample("2024-06-02T09:00:00+02:00", true),
        ];
        let first = DailySummary::from_samples(date, &samples, 0.5, 400);
        let second = DailySummary::from_samples(date, &samples, 0.5, 400);

        assert_eq!(first, second);
        assert!(first.finalized);
        assert_eq!(first.sample_count, 3);
        assert_eq!(first.total_sleep_minutes, 400);
    }

    #[test]
    fn test_summary_ready_reflects_data() {
        let empty = DailySummary::empty("2024-06-02".parse().unwrap());
        assert!(!SummaryReady::new(empty).has_data);

        let mut recorded = DailySummary::empty("2024-06-02".parse().unwrap());
        recorded.record_sample(true, 0.5, 0);
        let ready = SummaryReady::new(recorded);
        assert!(ready.has_data);
        assert_eq!(ready.date, ready.summary.date);
    }

    #[test]
    fn test_missing_finalized_flag_defaults_to_false() {
        let json = r#"{
            "date": "2024-06-02",
            "total_sleep_minutes": 10,
            "total_active_minutes": 1.5,
            "total_inactive_minutes": 2.0,
            "sample_count": 7
        }"#;
        let summary: DailySummary = serde_json::from_str(json).unwrap();
        assert!(!summary.finalized);
        assert_eq!(summary.sample_count, 7);
    }
}
