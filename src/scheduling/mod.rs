mod alerts;
mod common;
mod engine;
mod presenter;
mod scheduler;

pub use alerts::{Alert, AlertDispatcher, AlertEvent, AlertSnapshot};
pub use common::{GlobalTimerState, TimerState, TimerStatus};
pub use engine::{EngineHandle, EngineSnapshot, ReminderEngine};
pub use presenter::{AlertPresenter, LogAlertPresenter};
pub use scheduler::SchedulerCore;
