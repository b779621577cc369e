//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use st_core::{NightlyWindow, SleepConfig, ValidationError};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of all persisted state.
    pub data_dir: PathBuf,
    /// Collector base URL. Delivery is disabled when unset.
    pub endpoint: Option<String>,
    /// Collector token.
    pub token: Option<String>,
    /// Idle sampling period.
    pub sample_interval_secs: u64,
    /// Idle time at or above which a sample counts as inactive.
    pub inactivity_threshold_secs: u64,
    /// Inactivity inside one window occurrence before any of it counts.
    pub sleep_threshold_minutes: u32,
    /// Recurring night window, `HH:MM-HH:MM`.
    pub nightly_window: NightlyWindow,
    /// How often completed days are recomputed.
    pub recompute_interval_secs: u64,
    /// How many completed days each recompute pass covers.
    pub lookback_days: u32,
    /// Day-boundary gaps longer than this are filled as inactive.
    pub gap_tolerance_secs: u64,
    /// Ticks further apart than this reset live tracking.
    pub max_tick_gap_secs: u64,
    /// Upload processor cadence.
    pub queue_tick_secs: u64,
    /// Queued uploads older than this are purged.
    pub queue_retention_days: u32,
    /// Collector request timeout.
    pub request_timeout_secs: u64,
    /// Command printing the idle time in milliseconds.
    pub idle_command: Vec<String>,
    /// Optional message attached to days without sleep.
    pub no_sleep_message: Option<String>,
    /// Minimum days between two no-sleep messages.
    pub no_sleep_message_interval_days: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("sample_interval_secs", &self.sample_interval_secs)
            .field("inactivity_threshold_secs", &self.inactivity_threshold_secs)
            .field("sleep_threshold_minutes", &self.sleep_threshold_minutes)
            .field("nightly_window", &self.nightly_window.to_string())
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir,
            endpoint: None,
            token: None,
            sample_interval_secs: 30,
            inactivity_threshold_secs: 300,
            sleep_threshold_minutes: 60,
            nightly_window: NightlyWindow::default(),
            recompute_interval_secs: 3600,
            lookback_days: 7,
            gap_tolerance_secs: 30,
            max_tick_gap_secs: 300,
            queue_tick_secs: 5,
            queue_retention_days: 7,
            request_timeout_secs: 30,
            idle_command: vec!["xprintidle".to_string()],
            no_sleep_message: None,
            no_sleep_message_interval_days: 7,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ST_*)
        figment = figment.merge(Env::prefixed("ST_"));

        figment.extract()
    }

    /// Checks values that would make the loops spin or never fire.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("sample_interval_secs", self.sample_interval_secs),
            ("inactivity_threshold_secs", self.inactivity_threshold_secs),
            ("recompute_interval_secs", self.recompute_interval_secs),
            ("queue_tick_secs", self.queue_tick_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ValidationError::NonPositive { field, value: 0 });
            }
        }
        Ok(())
    }

    pub fn sleep_config(&self) -> SleepConfig {
        SleepConfig {
            window: self.nightly_window,
            threshold: TimeDelta::minutes(i64::from(self.sleep_threshold_minutes)),
        }
    }

    pub const fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    /// Minutes one sample stands for in the active/inactive totals.
    #[expect(clippy::cast_precision_loss, reason = "sample intervals are small")]
    pub const fn sample_minutes(&self) -> f64 {
        self.sample_interval_secs as f64 / 60.0
    }

    pub const fn inactivity_threshold(&self) -> Duration {
        Duration::from_secs(self.inactivity_threshold_secs)
    }

    pub const fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_interval_secs)
    }

    pub fn gap_tolerance(&self) -> TimeDelta {
        i64::try_from(self.gap_tolerance_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub const fn max_tick_gap(&self) -> Duration {
        Duration::from_secs(self.max_tick_gap_secs)
    }

    pub const fn queue_tick(&self) -> Duration {
        Duration::from_secs(self.queue_tick_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Returns the platform-specific config directory for st.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("st"))
}

/// Returns the platform-specific data directory for st.
///
/// On Linux: `~/.local/share/st`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("st"))
}
