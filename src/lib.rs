//! Break-reminder scheduling and alert dispatch.
//!
//! [`scheduling::SchedulerCore`] is the synchronous state machine,
//! [`scheduling::ReminderEngine`] runs it as a tokio actor. Persistence and
//! rendering stay with the caller: settings come in and go out as a
//! [`settings::ReminderSettings`] blob, alerts go out through an
//! [`scheduling::AlertPresenter`].

pub mod active_hours;
pub mod appsettings;
pub mod clock;
pub mod error;
pub mod registry;
pub mod reminder;
pub mod scheduling;
pub mod settings;

pub use error::{Result, SchedulerError, ValidationError};
