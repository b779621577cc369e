//! Authoritative recomputation of completed days.
//!
//! The live tracker only estimates. This pass rereads the raw sample log for
//! each completed day in the look-back window, rebuilds its intervals
//! (filling the day edges from the neighbouring days' samples), recomputes
//! sleep, and replaces the stored summary outright. Running it twice over
//! the same samples stores the same summary.

use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use st_core::{
    DailySummary, DaySamples, SleepConfig, SummaryReady, build_day_intervals, compute_sleep_minutes,
};
use st_store::{Storage, StoreError};

/// Settings for the recompute pass.
#[derive(Debug, Clone, Copy)]
pub struct RecomputeSettings {
    pub lookback_days: u32,
    pub gap_tolerance: TimeDelta,
    pub sample_minutes: f64,
    pub sleep: SleepConfig,
}

impl From<&crate::Config> for RecomputeSettings {
    fn from(config: &crate::Config) -> Self {
        Self {
            lookback_days: config.lookback_days,
            gap_tolerance: config.gap_tolerance(),
            sample_minutes: config.sample_minutes(),
            sleep: config.sleep_config(),
        }
    }
}

/// Recomputes daily summaries from the sample log.
pub struct SummaryScheduler {
    storage: Arc<Storage>,
    settings: RecomputeSettings,
}

impl SummaryScheduler {
    pub const fn new(storage: Arc<Storage>, settings: RecomputeSettings) -> Self {
        Self { storage, settings }
    }

    /// Recomputes one day and stores the result.
    ///
    /// Returns an event when the day has samples and either was not final
    /// yet, changed its sleep total, or `force` is set. Days without samples
    /// are left alone.
    pub fn recompute_day(&self, date: NaiveDate, force: bool) -> Result<Option<SummaryReady>, StoreError> {
        let samples = self.storage.samples().read_samples(date)?;
        if samples.is_empty() {
            tracing::debug!(%date, "no samples, skipping");
            return Ok(None);
        }

        let previous = match date.pred_opt() {
            Some(day) => self.storage.samples().read_samples(day)?,
            None => Vec::new(),
        };
        let next = match date.succ_opt() {
            Some(day) => self.storage.samples().read_samples(day)?,
            None => Vec::new(),
        };

        let day = DaySamples {
            date,
            samples: &samples,
            previous: previous.last(),
            next: next.first(),
        };
        let intervals = build_day_intervals(&day, self.settings.gap_tolerance);
        let sleep = compute_sleep_minutes(&intervals, &self.settings.sleep);
        let summary = DailySummary::from_samples(date, &samples, self.settings.sample_minutes, sleep);

        let existing = self.storage.summaries().get(date)?;
        let changed = existing
            .as_ref()
            .is_none_or(|stored| !stored.finalized || stored.total_sleep_minutes != sleep);
        self.storage.summaries().upsert(summary.clone())?;

        tracing::info!(
            %date,
            sleep_minutes = sleep,
            samples = summary.sample_count,
            changed,
            "recomputed day"
        );
        Ok((changed || force).then(|| SummaryReady::new(summary)))
    }

    /// Recomputes every completed day in the look-back window, oldest first.
    ///
    /// A failure on one day is logged and does not stop the others.
    pub fn recompute_completed_days(&self, today: NaiveDate) -> Vec<SummaryReady> {
        let mut ready = Vec::new();
        for back in (1..=self.settings.lookback_days).rev() {
            let Some(date) = today.checked_sub_signed(TimeDelta::days(i64::from(back))) else {
                continue;
            };
            match self.recompute_day(date, false) {
                Ok(Some(event)) => ready.push(event),
                Ok(None) => {}
                Err(err) => tracing::error!(%date, error = %err, "failed to recompute day"),
            }
        }
        ready
    }

    /// Recomputes the most recently completed day unconditionally.
    pub fn send_now(&self, today: NaiveDate) -> Result<Option<SummaryReady>, StoreError> {
        match today.pred_opt() {
            Some(yesterday) => self.recompute_day(yesterday, true),
            None => Ok(None),
        }
    }
}
