//! Live activity tracking.
//!
//! The tracker consumes one idle-time sample per tick, classifies it, logs
//! it, and keeps a running estimate in the day's summary. The estimate only
//! applies while the day is still open; once the recompute pass finalizes a
//! day, live ticks no longer touch its totals.
//!
//! Anything that makes the elapsed time since the previous tick meaningless
//! (resume from suspend, a clock change, a session switch, or a tick that
//! arrives much later than expected) resets the tracker so the next tick
//! starts fresh instead of bridging the gap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};
use st_core::{ActivityInterval, ActivitySample, SleepConfig, compute_sleep_minutes};
use st_store::{SampleRecord, Storage, StoreError};

/// Whether the tracker accepts samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Stopped,
    Running,
}

/// System events that invalidate the time since the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerSignal {
    Resumed,
    Suspended,
    ClockChanged,
    SessionSwitched,
}

/// Settings for the live tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    pub inactivity_threshold: Duration,
    pub sample_minutes: f64,
    pub max_tick_gap: Duration,
    pub sleep: SleepConfig,
}

impl From<&crate::Config> for TrackerSettings {
    fn from(config: &crate::Config) -> Self {
        Self {
            inactivity_threshold: config.inactivity_threshold(),
            sample_minutes: config.sample_minutes(),
            max_tick_gap: config.max_tick_gap(),
            sleep: config.sleep_config(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastTick {
    at: DateTime<FixedOffset>,
    was_active: bool,
}

/// What a processed tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    pub sample: ActivitySample,
    pub sleep_increment: u32,
}

/// The live activity state machine.
pub struct ActivityTracker {
    storage: Arc<Storage>,
    settings: TrackerSettings,
    state: TrackerState,
    last_tick: Option<LastTick>,
}

impl ActivityTracker {
    pub const fn new(storage: Arc<Storage>, settings: TrackerSettings) -> Self {
        Self {
            storage,
            settings,
            state: TrackerState::Stopped,
            last_tick: None,
        }
    }

    pub const fn state(&self) -> TrackerState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = TrackerState::Running;
        self.last_tick = None;
        tracing::info!("activity tracking started");
    }

    pub fn stop(&mut self) {
        self.state = TrackerState::Stopped;
        self.last_tick = None;
        tracing::info!("activity tracking stopped");
    }

    /// Forgets the previous tick.
    pub fn reset(&mut self) {
        self.last_tick = None;
    }

    pub fn handle_signal(&mut self, signal: TrackerSignal) {
        match signal {
            TrackerSignal::Suspended => tracing::info!("system suspending"),
            TrackerSignal::Resumed | TrackerSignal::ClockChanged | TrackerSignal::SessionSwitched => {
                tracing::info!(?signal, "resetting activity tracking");
                self.reset();
            }
        }
    }

    /// Processes one sample. Returns `None` while stopped.
    pub fn on_sample(
        &mut self,
        now: DateTime<FixedOffset>,
        idle: Duration,
    ) -> Result<Option<TickRecord>, StoreError> {
        if self.state == TrackerState::Stopped {
            tracing::debug!("ignoring sample while stopped");
            return Ok(None);
        }

        if let Some(last) = self.last_tick {
            let max_gap = TimeDelta::from_std(self.settings.max_tick_gap).unwrap_or(TimeDelta::MAX);
            let elapsed = now - last.at;
            if elapsed < TimeDelta::zero() || elapsed > max_gap {
                tracing::info!(elapsed_secs = elapsed.num_seconds(), "implausible tick gap, resetting");
                self.last_tick = None;
            }
        }

        let is_active = idle < self.settings.inactivity_threshold;
        let sleep_increment = match self.last_tick {
            Some(last) if !last.was_active && !is_active => compute_sleep_minutes(
                &[ActivityInterval::inactive(last.at, now)],
                &self.settings.sleep,
            ),
            _ => 0,
        };
        let sample = ActivitySample {
            timestamp: now,
            is_active,
            idle_minutes: idle.as_secs_f64() / 60.0,
        };
        if let Err(err) = self.persist(&sample, sleep_increment) {
            // The log now has a hole; don't bridge it on the next tick.
            self.last_tick = None;
            return Err(err);
        }
        self.last_tick = Some(LastTick {
            at: now,
            was_active: is_active,
        });

        tracing::debug!(
            is_active,
            idle_secs = idle.as_secs(),
            sleep_increment,
            "recorded sample"
        );
        Ok(Some(TickRecord {
            sample,
            sleep_increment,
        }))
    }

    fn persist(&self, sample: &ActivitySample, sleep_increment: u32) -> Result<(), StoreError> {
        self.storage
            .samples()
            .append(&SampleRecord::new(sample, sleep_increment))?;

        let sample_minutes = self.settings.sample_minutes;
        let is_active = sample.is_active;
        self.storage.summaries().update(sample.local_date(), |summary| {
            if !summary.finalized {
                summary.record_sample(is_active, sample_minutes, sleep_increment);
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use st_core::DailySummary;

    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            inactivity_threshold: Duration::from_secs(300),
            sample_minutes: 0.5,
            max_tick_gap: Duration::from_secs(300),
            sleep: SleepConfig::default(),
        }
    }

    fn tracker(settings: TrackerSettings) -> (tempfile::TempDir, Arc<Storage>, ActivityTracker) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let mut tracker = ActivityTracker::new(Arc::clone(&storage), settings);
        tracker.start();
        (dir, storage, tracker)
    }

    const IDLE: Duration = Duration::from_secs(600);
    const BUSY: Duration = Duration::from_secs(2);

    #[test]
    fn test_stopped_tracker_ignores_samples() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let mut tracker = ActivityTracker::new(Arc::clone(&storage), settings());

        assert_eq!(tracker.state(), TrackerState::Stopped);
        assert!(tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap().is_none());
        assert!(storage.summaries().all().unwrap().is_empty());
    }

    #[test]
    fn test_classifies_against_threshold() {
        let (_dir, _storage, mut tracker) = tracker(settings());
        let busy = tracker.on_sample(at("2024-06-02T10:00:00+02:00"), BUSY).unwrap().unwrap();
        let edge = tracker
            .on_sample(at("2024-06-02T10:00:30+02:00"), Duration::from_secs(300))
            .unwrap()
            .unwrap();
        assert!(busy.sample.is_active);
        assert!(!edge.sample.is_active);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "sums of halves are exact")]
    fn test_samples_are_logged_and_summarized() {
        let (_dir, storage, mut tracker) = tracker(settings());
        tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap();
        tracker.on_sample(at("2024-06-02T01:00:30+02:00"), IDLE).unwrap();
        tracker.on_sample(at("2024-06-02T01:01:00+02:00"), BUSY).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(storage.samples().read_day(date).unwrap().len(), 3);

        let summary = storage.summaries().get(date).unwrap().unwrap();
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.total_inactive_minutes, 1.0);
        assert_eq!(summary.total_active_minutes, 0.5);
        assert_eq!(summary.total_sleep_minutes, 0);
    }

    #[test]
    fn test_increment_uses_interval_since_last_inactive_tick() {
        let settings = TrackerSettings {
            max_tick_gap: Duration::from_secs(3 * 3600),
            sleep: SleepConfig {
                threshold: TimeDelta::zero(),
                ..SleepConfig::default()
            },
            ..settings()
        };
        let (_dir, _storage, mut tracker) = tracker(settings);

        let first = tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap().unwrap();
        let second = tracker.on_sample(at("2024-06-02T02:00:00+02:00"), IDLE).unwrap().unwrap();
        let third = tracker.on_sample(at("2024-06-02T02:30:00+02:00"), BUSY).unwrap().unwrap();

        assert_eq!(first.sleep_increment, 0);
        assert_eq!(second.sleep_increment, 60);
        assert_eq!(third.sleep_increment, 0);
    }

    #[test]
    fn test_signal_reset_drops_previous_tick() {
        let settings = TrackerSettings {
            sleep: SleepConfig {
                threshold: TimeDelta::zero(),
                ..SleepConfig::default()
            },
            ..settings()
        };
        let (_dir, _storage, mut tracker) = tracker(settings);

        tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap();
        tracker.handle_signal(TrackerSignal::Suspended);
        let kept = tracker.on_sample(at("2024-06-02T01:01:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(kept.sleep_increment, 1);

        tracker.handle_signal(TrackerSignal::Resumed);
        let reset = tracker.on_sample(at("2024-06-02T01:02:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(reset.sleep_increment, 0);
    }

    #[test]
    fn test_long_or_backwards_gap_resets() {
        let settings = TrackerSettings {
            sleep: SleepConfig {
                threshold: TimeDelta::zero(),
                ..SleepConfig::default()
            },
            ..settings()
        };
        let (_dir, _storage, mut tracker) = tracker(settings);

        tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap();
        let late = tracker.on_sample(at("2024-06-02T03:00:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(late.sleep_increment, 0);

        let backwards = tracker.on_sample(at("2024-06-02T02:00:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(backwards.sleep_increment, 0);
    }

    #[test]
    fn test_finalized_day_is_not_touched() {
        let (_dir, storage, mut tracker) = tracker(settings());
        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let finalized = DailySummary {
            total_sleep_minutes: 420,
            sample_count: 900,
            finalized: true,
            ..DailySummary::empty(date)
        };
        storage.summaries().upsert(finalized.clone()).unwrap();

        tracker.on_sample(at("2024-06-02T23:30:00+02:00"), IDLE).unwrap();

        assert_eq!(storage.summaries().get(date).unwrap(), Some(finalized));
        assert_eq!(storage.samples().read_day(date).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_does_not_advance_last_tick() {
        let settings = TrackerSettings {
            max_tick_gap: Duration::from_secs(3 * 3600),
            sleep: SleepConfig {
                threshold: TimeDelta::zero(),
                ..SleepConfig::default()
            },
            ..settings()
        };
        let (_dir, storage, mut tracker) = tracker(settings);
        let samples_dir = storage.samples().dir().to_path_buf();
        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();

        tracker.on_sample(at("2024-06-02T01:00:00+02:00"), IDLE).unwrap();

        // A plain file where the log directory should be makes appends fail.
        std::fs::remove_dir_all(&samples_dir).unwrap();
        std::fs::write(&samples_dir, b"").unwrap();
        assert!(tracker.on_sample(at("2024-06-02T02:00:00+02:00"), IDLE).is_err());
        assert_eq!(storage.summaries().get(date).unwrap().unwrap().sample_count, 1);

        std::fs::remove_file(&samples_dir).unwrap();
        std::fs::create_dir(&samples_dir).unwrap();
        let next = tracker.on_sample(at("2024-06-02T02:30:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(next.sleep_increment, 0, "no increment from an unlogged tick");

        let after = tracker.on_sample(at("2024-06-02T03:00:00+02:00"), IDLE).unwrap().unwrap();
        assert_eq!(after.sleep_increment, 30);
    }
}
