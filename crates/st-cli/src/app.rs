//! Wiring between configuration, storage, and the runtime components.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use st_net::HttpDelivery;
use st_store::Storage;

use crate::Config;
use crate::device::{self, DeviceIdentity};
use crate::enqueue::{NoSleepMessage, SummaryEnqueuer};
use crate::processor::{ProcessorSettings, UploadProcessor};
use crate::recompute::{RecomputeSettings, SummaryScheduler};
use crate::tracker::{ActivityTracker, TrackerSettings};

/// An opened data directory plus the configuration it was opened with.
pub struct App {
    pub config: Config,
    pub storage: Arc<Storage>,
}

impl App {
    /// Validates the configuration and opens the data directory.
    pub fn open(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let storage = Storage::open(&config.data_dir)
            .with_context(|| format!("failed to open {}", config.data_dir.display()))?;
        Ok(Self {
            config,
            storage: Arc::new(storage),
        })
    }

    pub fn device_path(&self) -> PathBuf {
        device::device_json_path(&self.config.data_dir)
    }

    /// Loads the device identity, creating it on first use.
    pub fn device(&self) -> Result<DeviceIdentity> {
        device::init_device_at(&self.device_path(), None)
    }

    pub fn tracker(&self) -> ActivityTracker {
        ActivityTracker::new(Arc::clone(&self.storage), TrackerSettings::from(&self.config))
    }

    pub fn scheduler(&self) -> SummaryScheduler {
        SummaryScheduler::new(Arc::clone(&self.storage), RecomputeSettings::from(&self.config))
    }

    pub fn enqueuer(&self) -> Result<SummaryEnqueuer> {
        Ok(SummaryEnqueuer::new(
            Arc::clone(&self.storage),
            self.device_path(),
            self.device()?,
            NoSleepMessage::from_config(&self.config),
        ))
    }

    /// The collector client, or `None` when no endpoint is configured.
    pub fn delivery(&self) -> Result<Option<HttpDelivery>> {
        let Some(endpoint) = &self.config.endpoint else {
            return Ok(None);
        };
        let client = HttpDelivery::new(endpoint, self.config.token.clone(), self.config.request_timeout())
            .context("failed to set up collector client")?;
        Ok(Some(client))
    }

    pub fn processor(&self) -> Result<Option<UploadProcessor<HttpDelivery>>> {
        Ok(self.delivery()?.map(|delivery| {
            UploadProcessor::new(
                Arc::clone(&self.storage),
                delivery,
                ProcessorSettings::from(&self.config),
            )
        }))
    }
}

/// The current local time with its UTC offset.
pub fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            data_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_open_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config(&dir.path().join("st"))).unwrap();
        assert!(app.storage.root().join("queue").is_dir());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Config {
            sample_interval_secs: 0,
            ..config(dir.path())
        };
        assert!(App::open(bad).is_err());
    }

    #[test]
    fn test_no_endpoint_means_no_processor() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config(dir.path())).unwrap();
        assert!(app.delivery().unwrap().is_none());
        assert!(app.processor().unwrap().is_none());
    }

    #[test]
    fn test_endpoint_builds_processor() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(Config {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            ..config(dir.path())
        })
        .unwrap();
        assert!(app.processor().unwrap().is_some());
    }

    #[test]
    fn test_device_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::open(config(dir.path())).unwrap();
        assert_eq!(app.device().unwrap(), app.device().unwrap());
    }
}
