//! The recurring nightly window.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

const fn time_of_day(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("invalid constant time of day"),
    }
}

const DEFAULT_START: NaiveTime = time_of_day(23, 0);
const DEFAULT_END: NaiveTime = time_of_day(8, 0);

/// A recurring local time-of-day range, e.g. `23:00-08:00`.
///
/// The end is exclusive. When `end <= start` the window crosses midnight,
/// so `23:00-08:00` covers nine local hours regardless of DST shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NightlyWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl Default for NightlyWindow {
    fn default() -> Self {
        Self::new(DEFAULT_START, DEFAULT_END)
    }
}

impl NightlyWindow {
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveTime {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveTime {
        self.end
    }

    /// Returns true when the window wraps past midnight.
    #[must_use]
    pub fn crosses_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// Returns true if the local time of day falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.crosses_midnight() {
            time >= self.start || time < self.end
        } else {
            self.start <= time && time < self.end
        }
    }

    /// Local bounds of the occurrence that opens on `day`.
    ///
    /// For a midnight-crossing window the end falls on the following day.
    #[must_use]
    pub fn occurrence(&self, day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let end_day = if self.crosses_midnight() {
            day.succ_opt().unwrap_or(day)
        } else {
            day
        };
        (day.and_time(self.start), end_day.and_time(self.end))
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTime {
            value: value.to_string(),
        })
}

fn format_time(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

impl FromStr for NightlyWindow {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ValidationError::InvalidWindow {
                value: s.to_string(),
                reason: "expected START-END",
            })?;
        Ok(Self::new(parse_time(start)?, parse_time(end)?))
    }
}

impl fmt::Display for NightlyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_time(self.start), format_time(self.end))
    }
}

impl TryFrom<String> for NightlyWindow {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NightlyWindow> for String {
    fn from(window: NightlyWindow) -> Self {
        window.to_string()
    }
}
