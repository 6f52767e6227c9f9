use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::reminder::ReminderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Waiting,
    AlertActive,
}

/// State of the start/pause button driving the main reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalTimerState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Read-only projection of one reminder's countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStatus {
    pub id: ReminderId,
    pub time_left_ms: i64,
    pub total_time_ms: i64,
    pub status: TimerState,
}

impl TimerStatus {
    pub(crate) fn new(
        id: ReminderId,
        time_left: TimeDelta,
        total_time: TimeDelta,
        status: TimerState,
    ) -> Self {
        Self {
            id,
            time_left_ms: time_left.num_milliseconds(),
            total_time_ms: total_time.num_milliseconds(),
            status,
        }
    }

    pub fn time_left(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.time_left_ms)
    }
}

/// Countdown bookkeeping the scheduler keeps per live reminder between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimerRuntime {
    pub state: TimerState,
    pub time_left: TimeDelta,
    pub total_time: TimeDelta,
    /// One-time countdown captured when the active window closed.
    pub frozen: Option<TimeDelta>,
}

impl TimerRuntime {
    pub fn idle(total_time: TimeDelta) -> Self {
        Self {
            state: TimerState::Idle,
            time_left: total_time,
            total_time,
            frozen: None,
        }
    }
}
