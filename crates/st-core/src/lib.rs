//! Core domain logic for the sleep tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Windows: the recurring local-time night window
//! - Sleep: turning activity intervals into DST-correct sleep minutes
//! - Samples: building intervals from the raw sample stream, with day-boundary gap filling
//! - Delivery: queued upload records and the retry backoff policy
//!
//! Nothing in here touches the filesystem or the network.

pub mod backoff;
mod interval;
pub mod sample;
pub mod sleep;
pub mod summary;
mod types;
pub mod upload;
mod window;

pub use backoff::BackoffPolicy;
pub use interval::{ActivityInterval, InactivitySpan, build_inactivity_spans};
pub use sample::{ActivitySample, DaySamples, build_day_intervals, build_intervals};
pub use sleep::{SleepConfig, SleepIntersection, compute_sleep_minutes, intersect_with_window};
pub use summary::{DailySummary, SummaryReady};
pub use types::ValidationError;
pub use upload::QueuedUpload;
pub use window::NightlyWindow;
