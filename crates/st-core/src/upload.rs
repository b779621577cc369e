//! Delivery records.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::summary::DailySummary;

/// One pending delivery to the collector.
///
/// This is also the wire shape: the collector reads camelCase fields and a
/// `yyyy-MM-dd` date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedUpload {
    pub device_id: String,
    pub date: NaiveDate,
    pub sleep_minutes: u32,
    pub computed_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueuedUpload {
    /// Builds a record from a finished summary.
    #[must_use]
    pub fn from_summary(
        device_id: impl Into<String>,
        summary: &DailySummary,
        computed_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            date: summary.date,
            sleep_minutes: summary.total_sleep_minutes,
            computed_at,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
