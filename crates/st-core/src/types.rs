//! Shared validation errors.

use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A time of day could not be parsed.
    #[error("invalid time of day: {value}")]
    InvalidTime { value: String },

    /// A window definition was malformed.
    #[error("invalid window '{value}': {reason}")]
    InvalidWindow { value: String, reason: &'static str },

    /// A duration setting was out of range.
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },
}
