//! Turns summary-ready events into queued uploads.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use st_core::{QueuedUpload, SummaryReady};
use st_store::{QueueId, Storage};

use crate::device::{self, DeviceIdentity};

/// Optional note attached to uploads for days without sleep.
#[derive(Debug, Clone)]
pub struct NoSleepMessage {
    pub text: String,
    /// Minimum days between two messages.
    pub interval_days: u32,
}

impl NoSleepMessage {
    pub fn from_config(config: &crate::Config) -> Option<Self> {
        config.no_sleep_message.as_ref().map(|text| Self {
            text: text.clone(),
            interval_days: config.no_sleep_message_interval_days,
        })
    }

    /// Rate limit keyed on the night the message is about, not on when it
    /// gets enqueued.
    fn is_due(&self, last_sent: Option<NaiveDate>, night: NaiveDate) -> bool {
        last_sent.is_none_or(|last| (night - last).num_days() >= i64::from(self.interval_days))
    }
}

/// Consumes summary-ready events and enqueues delivery records.
pub struct SummaryEnqueuer {
    storage: Arc<Storage>,
    device_path: PathBuf,
    device: DeviceIdentity,
    no_sleep: Option<NoSleepMessage>,
}

impl SummaryEnqueuer {
    pub const fn new(
        storage: Arc<Storage>,
        device_path: PathBuf,
        device: DeviceIdentity,
        no_sleep: Option<NoSleepMessage>,
    ) -> Self {
        Self {
            storage,
            device_path,
            device,
            no_sleep,
        }
    }

    /// Enqueues an upload for the event. Events without data are ignored.
    pub fn handle(&mut self, event: &SummaryReady, now: DateTime<FixedOffset>) -> Result<Option<QueueId>> {
        if !event.has_data {
            tracing::debug!(date = %event.date, "summary has no data, not enqueuing");
            return Ok(None);
        }

        let mut record = QueuedUpload::from_summary(&self.device.device_id, &event.summary, now);
        let attach_message = match &self.no_sleep {
            Some(message)
                if event.summary.total_sleep_minutes == 0
                    && message.is_due(self.device.last_no_sleep_message_date, event.date) =>
            {
                record = record.with_message(message.text.clone());
                true
            }
            _ => false,
        };

        let id = self
            .storage
            .queue()
            .enqueue(&record)
            .with_context(|| format!("failed to enqueue upload for {}", event.date))?;
        tracing::info!(%id, date = %event.date, minutes = record.sleep_minutes, "queued upload");

        if attach_message {
            self.device.last_no_sleep_message_date = Some(event.date);
            device::save_to(&self.device_path, &self.device)?;
        }
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use st_core::DailySummary;

    use super::*;

    fn now(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn event(date: &str, sleep: u32, samples: u32) -> SummaryReady {
        SummaryReady::new(DailySummary {
            total_sleep_minutes: sleep,
            sample_count: samples,
            finalized: true,
            ..DailySummary::empty(date.parse().unwrap())
        })
    }

    fn enqueuer(no_sleep: Option<NoSleepMessage>) -> (tempfile::TempDir, Arc<Storage>, SummaryEnqueuer) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let device_path = device::device_json_path(dir.path());
        let identity = device::init_device_at(&device_path, Some("test")).unwrap();
        let enqueuer = SummaryEnqueuer::new(Arc::clone(&storage), device_path, identity, no_sleep);
        (dir, storage, enqueuer)
    }

    fn message() -> Option<NoSleepMessage> {
        Some(NoSleepMessage {
            text: "no sleep recorded".to_string(),
            interval_days: 7,
        })
    }

    #[test]
    fn test_event_without_data_is_ignored() {
        let (_dir, storage, mut enqueuer) = enqueuer(None);
        let id = enqueuer
            .handle(&event("2024-06-02", 0, 0), now("2024-06-03T08:05:00+02:00"))
            .unwrap();
        assert!(id.is_none());
        assert_eq!(storage.queue().pending_count(), 0);
    }

    #[test]
    fn test_event_is_enqueued_with_device_id() {
        let (_dir, storage, mut enqueuer) = enqueuer(None);
        let id = enqueuer
            .handle(&event("2024-06-02", 420, 2000), now("2024-06-03T08:05:00+02:00"))
            .unwrap()
            .unwrap();

        let record = storage.queue().read(&id).unwrap();
        assert_eq!(record.sleep_minutes, 420);
        assert_eq!(record.date, "2024-06-02".parse::<NaiveDate>().unwrap());
        assert!(record.device_id.starts_with("device-"));
        assert!(record.message.is_none());
    }

    #[test]
    fn test_no_sleep_message_is_rate_limited() {
        let (dir, storage, mut enqueuer) = enqueuer(message());

        let first = enqueuer
            .handle(&event("2024-06-02", 0, 100), now("2024-06-03T08:05:00+02:00"))
            .unwrap()
            .unwrap();
        let second = enqueuer
            .handle(&event("2024-06-03", 0, 100), now("2024-06-04T08:05:00+02:00"))
            .unwrap()
            .unwrap();
        let later = enqueuer
            .handle(&event("2024-06-09", 0, 100), now("2024-06-10T08:05:00+02:00"))
            .unwrap()
            .unwrap();

        let queue = storage.queue();
        assert_eq!(queue.read(&first).unwrap().message.as_deref(), Some("no sleep recorded"));
        assert!(queue.read(&second).unwrap().message.is_none());
        assert!(queue.read(&later).unwrap().message.is_some());

        let saved = device::load_from(&device::device_json_path(dir.path())).unwrap().unwrap();
        assert_eq!(saved.last_no_sleep_message_date, Some("2024-06-09".parse().unwrap()));
    }

    #[test]
    fn test_backlog_rate_limit_follows_summary_dates() {
        let (_dir, storage, mut enqueuer) = enqueuer(message());
        let enqueued_at = now("2024-06-12T08:05:00+02:00");

        let early = enqueuer.handle(&event("2024-06-01", 0, 100), enqueued_at).unwrap().unwrap();
        let close = enqueuer.handle(&event("2024-06-04", 0, 100), enqueued_at).unwrap().unwrap();
        let week_later = enqueuer.handle(&event("2024-06-08", 0, 100), enqueued_at).unwrap().unwrap();

        let queue = storage.queue();
        assert!(queue.read(&early).unwrap().message.is_some());
        assert!(queue.read(&close).unwrap().message.is_none());
        assert!(queue.read(&week_later).unwrap().message.is_some());
    }

    #[test]
    fn test_no_message_when_sleep_recorded() {
        let (_dir, storage, mut enqueuer) = enqueuer(message());
        let id = enqueuer
            .handle(&event("2024-06-02", 30, 100), now("2024-06-03T08:05:00+02:00"))
            .unwrap()
            .unwrap();
        assert!(storage.queue().read(&id).unwrap().message.is_none());
    }
}
