//! Scheduling error types.

use thiserror::Error;

use crate::cron::CronField;

/// Errors that can occur while scheduling or parsing.
///
/// `Callback` and `Interrupted` are the variants an error handler sees;
/// the rest surface through fallible API calls.
#[derive(Debug, Error)]
pub enum ChimeError {
    /// The user callback returned an error or panicked.
    #[error("callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// The running callback was interrupted by a cancel or hard shutdown.
    #[error("callback interrupted")]
    Interrupted,

    /// Append was called on an immutable schedule.
    #[error("schedule does not support appends")]
    NotMutable,

    /// A cron expression failed to parse.
    #[error("invalid cron expression: {0}")]
    Cron(#[from] CronError),
}

impl ChimeError {
    /// Whether this error is an interruption delivered to a running callback.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ChimeError::Interrupted)
    }
}

/// Structured cron parse errors.
///
/// Carries the offending field key, token, and bounds so callers can report
/// exactly what was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    /// The expression has the wrong number of whitespace-separated fields.
    #[error("expected {expected} fields, got {got} in '{expr}'")]
    FieldCount {
        expected: usize,
        got: usize,
        expr: String,
    },

    /// A token could not be parsed in the context of its field.
    #[error("{field} field: invalid token '{token}'")]
    InvalidToken { field: CronField, token: String },

    /// A value is outside the field's bounds.
    #[error("{field} field: value {value} out of bounds {lower}..={upper}")]
    OutOfBounds {
        field: CronField,
        value: u32,
        lower: u32,
        upper: u32,
    },

    /// A range runs backwards, e.g. `30-10`.
    #[error("{field} field: range '{token}' runs backwards")]
    ReversedRange { field: CronField, token: String },

    /// A step value is zero or unparseable.
    #[error("{field} field: invalid step '{step}'")]
    InvalidStep { field: CronField, step: String },
}

/// Result type for scheduling operations.
pub type Result<T> = std::result::Result<T, ChimeError>;
