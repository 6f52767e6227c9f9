//! Serialized settings blob, in the shape the desktop app stores it.
//!
//! Loading is tolerant: missing optional fields fall back to defaults, blank
//! time ranges are dropped and malformed custom reminders are skipped with a
//! warning. Fields this crate does not own are carried through untouched.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    active_hours::{ActiveHoursConfig, TimeRange, WorkMode},
    error::ValidationError,
    registry::ReminderRegistry,
    reminder::{
        CustomReminder, Interval, IntervalSchedule, IntervalUnit, IntervalValue,
        MainReminderSettings, ReminderId, ReminderKind,
    },
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderSettings {
    #[serde(
        deserialize_with = "lenient_interval_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval_value: Option<u32>,
    pub interval_unit: IntervalUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_suffix: Option<String>,
    pub active_hours_enabled: bool,
    pub work_mode: WorkMode,
    pub is_big_week: bool,
    pub skip_holidays: bool,
    pub active_hours_ranges: Vec<StoredTimeRange>,
    pub custom_reminders: Vec<StoredReminder>,
    /// Everything else the app keeps in the same blob (theme, sound, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredTimeRange {
    pub id: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredReminderType {
    Interval,
    OneTime,
}

/// One entry of `customReminders`. Instants are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReminder {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub reminder_type: StoredReminderType,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(
        default,
        deserialize_with = "lenient_interval_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_unit: Option<IntervalUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_trigger_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_remaining_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_remaining_time: Option<i64>,
}

fn enabled_by_default() -> bool {
    true
}

/// The settings form stores whatever is in the number input, which can be a
/// number, a numeric string or an empty string.
fn lenient_interval_value<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    Ok(parsed.map(|value| u32::try_from(value).unwrap_or(u32::MAX)))
}

impl ReminderSettings {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Main reminder settings, with the interval pulled into range the same
    /// way the settings form clamps its input.
    pub fn main_settings(&self) -> MainReminderSettings {
        let defaults = MainReminderSettings::default();
        let interval = match self.interval_value {
            Some(value) => Interval {
                value: IntervalValue::clamped(value),
                unit: self.interval_unit,
            },
            None => Interval {
                unit: self.interval_unit,
                ..defaults.interval
            },
        };

        MainReminderSettings {
            interval,
            message_prefix: self
                .message_prefix
                .clone()
                .unwrap_or(defaults.message_prefix),
            message_suffix: self
                .message_suffix
                .clone()
                .unwrap_or(defaults.message_suffix),
        }
    }

    pub fn active_hours(&self) -> ActiveHoursConfig {
        let ranges = self
            .active_hours_ranges
            .iter()
            .filter_map(|stored| match TimeRange::parse(&stored.start, &stored.end) {
                Ok(range) => range,
                Err(err) => {
                    log::warn!("Ignoring active hours range [range_id = {}]: {}", stored.id, err);
                    None
                }
            })
            .collect();

        ActiveHoursConfig {
            enabled: self.active_hours_enabled,
            work_mode: self.work_mode,
            is_big_week: self.is_big_week,
            skip_holidays: self.skip_holidays,
            ranges,
        }
    }

    /// Custom reminders that could be decoded, in stored order.
    pub fn custom_reminders(&self) -> Vec<CustomReminder> {
        self.custom_reminders
            .iter()
            .filter_map(|stored| match stored.to_reminder() {
                Ok(reminder) => Some(reminder),
                Err(err) => {
                    log::warn!("Skipping stored reminder [reminder_id = {}]: {}", stored.id, err);
                    None
                }
            })
            .collect()
    }

    /// Writes the engine-owned fields back, keeping `extra` as it was.
    pub fn update_from(&mut self, registry: &ReminderRegistry, active_hours: &ActiveHoursConfig) {
        let main = registry.main();
        self.interval_value = Some(main.schedule.interval.value.get());
        self.interval_unit = main.schedule.interval.unit;
        self.message_prefix = Some(main.message_prefix.clone());
        self.message_suffix = Some(main.message_suffix.clone());

        self.active_hours_enabled = active_hours.enabled;
        self.work_mode = active_hours.work_mode;
        self.is_big_week = active_hours.is_big_week;
        self.skip_holidays = active_hours.skip_holidays;
        self.active_hours_ranges = active_hours
            .ranges
            .iter()
            .enumerate()
            .map(|(index, range)| StoredTimeRange {
                id: (index + 1).to_string(),
                start: range.start.format("%H:%M").to_string(),
                end: range.end.format("%H:%M").to_string(),
            })
            .collect();

        self.custom_reminders = registry.iter().map(StoredReminder::from_reminder).collect();
    }
}

impl StoredReminder {
    pub fn to_reminder(&self) -> Result<CustomReminder, ValidationError> {
        let kind = match self.reminder_type {
            StoredReminderType::Interval => {
                let value = self.interval_value.ok_or(ValidationError::MissingField {
                    field: "intervalValue",
                    reminder_type: "interval",
                })?;
                let interval = Interval::new(value, self.interval_unit.unwrap_or_default())?;

                ReminderKind::Interval(IntervalSchedule {
                    interval,
                    next_trigger_time: self
                        .next_trigger_time
                        .map(|millis| instant(millis, "nextTriggerTime"))
                        .transpose()?,
                    paused_remaining: self
                        .paused_remaining_time
                        .map(|millis| TimeDelta::milliseconds(millis.max(0))),
                    waiting_remaining: self
                        .waiting_remaining_time
                        .map(|millis| TimeDelta::milliseconds(millis.max(0))),
                })
            }
            StoredReminderType::OneTime => {
                let millis = self.target_date_time.ok_or(ValidationError::MissingField {
                    field: "targetDateTime",
                    reminder_type: "onetime",
                })?;

                ReminderKind::OneTime {
                    target_date_time: instant(millis, "targetDateTime")?,
                }
            }
        };

        let id = if self.id.trim().is_empty() {
            ReminderId::generate()
        } else {
            ReminderId::from(self.id.as_str())
        };

        Ok(CustomReminder {
            id,
            title: self.title.clone(),
            enabled: self.enabled,
            kind,
        })
    }

    pub fn from_reminder(reminder: &CustomReminder) -> Self {
        let mut stored = Self {
            id: reminder.id.as_str().to_owned(),
            title: reminder.title.clone(),
            reminder_type: StoredReminderType::OneTime,
            enabled: reminder.enabled,
            interval_value: None,
            interval_unit: None,
            target_date_time: None,
            next_trigger_time: None,
            paused_remaining_time: None,
            waiting_remaining_time: None,
        };

        match &reminder.kind {
            ReminderKind::Interval(schedule) => {
                stored.reminder_type = StoredReminderType::Interval;
                stored.interval_value = Some(schedule.interval.value.get());
                stored.interval_unit = Some(schedule.interval.unit);
                stored.next_trigger_time = schedule.next_trigger_time.map(|at| at.timestamp_millis());
                stored.paused_remaining_time =
                    schedule.paused_remaining.map(|left| left.num_milliseconds());
                stored.waiting_remaining_time =
                    schedule.waiting_remaining.map(|left| left.num_milliseconds());
            }
            ReminderKind::OneTime { target_date_time } => {
                stored.target_date_time = Some(target_date_time.timestamp_millis());
            }
        }

        stored
    }
}

fn instant(millis: i64, field: &'static str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp_millis(millis).ok_or(ValidationError::InvalidTimestamp(millis, field))
}
