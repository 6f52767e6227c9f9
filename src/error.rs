use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::reminder::ReminderId;

/// Input rejected at the registry or settings boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Interval value {value} is outside of the allowed range {min}..={max}")]
    IntervalOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Target time {target} must be in the future [now = {now}]")]
    TargetNotInFuture {
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Reminder title must not be blank")]
    BlankTitle,

    #[error("Invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),

    #[error("Invalid timestamp {0} for field '{1}'")]
    InvalidTimestamp(i64, &'static str),

    #[error("Missing field '{field}' for {reminder_type} reminder")]
    MissingField {
        field: &'static str,
        reminder_type: &'static str,
    },
}

/// A command that the scheduler refused to apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No such reminder [reminder_id = {0}]")]
    NotFound(ReminderId),

    #[error("No active alert for reminder [reminder_id = {0}]")]
    NoActiveAlert(ReminderId),

    #[error("The main reminder cannot be edited through this command")]
    MainReminderNotEditable,

    #[error("The main timer is managed by active hours and cannot be toggled manually")]
    ManagedByActiveHours,
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
