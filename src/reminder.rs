use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MAIN_REMINDER_ID: &str = "main";
pub const MAIN_REMINDER_TITLE: &str = "Time to get up and walk";

pub const MIN_INTERVAL_VALUE: u32 = 1;
pub const MAX_INTERVAL_VALUE: u32 = 99_999;

const DEFAULT_MAIN_INTERVAL: u32 = 45;
const DEFAULT_MESSAGE_PREFIX: &str = "You have been sitting for ";
const DEFAULT_MESSAGE_SUFFIX: &str = ".\\nStand up and stretch for a bit!";

/// Opaque reminder identifier. Custom reminders get a random one on
/// creation, the main reminder always uses [`MAIN_REMINDER_ID`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(String);

impl ReminderId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn main() -> Self {
        Self(MAIN_REMINDER_ID.to_owned())
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_REMINDER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReminderId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ReminderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    #[default]
    Minutes,
    Hours,
}

impl IntervalUnit {
    pub fn seconds(self) -> i64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
        }
    }

    fn label(self, plural: bool) -> &'static str {
        match (self, plural) {
            (IntervalUnit::Seconds, false) => "second",
            (IntervalUnit::Seconds, true) => "seconds",
            (IntervalUnit::Minutes, false) => "minute",
            (IntervalUnit::Minutes, true) => "minutes",
            (IntervalUnit::Hours, false) => "hour",
            (IntervalUnit::Hours, true) => "hours",
        }
    }
}

/// Interval length in units, always within
/// [`MIN_INTERVAL_VALUE`]..=[`MAX_INTERVAL_VALUE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct IntervalValue(u32);

impl IntervalValue {
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if !(MIN_INTERVAL_VALUE..=MAX_INTERVAL_VALUE).contains(&value) {
            return Err(ValidationError::IntervalOutOfRange {
                value,
                min: MIN_INTERVAL_VALUE,
                max: MAX_INTERVAL_VALUE,
            });
        }

        Ok(Self(value))
    }

    /// Pulls the value into range the way the settings form does before
    /// submitting numeric input.
    pub fn clamped(value: u32) -> Self {
        Self(value.clamp(MIN_INTERVAL_VALUE, MAX_INTERVAL_VALUE))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for IntervalValue {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IntervalValue> for u32 {
    fn from(value: IntervalValue) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub value: IntervalValue,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn new(value: u32, unit: IntervalUnit) -> Result<Self, ValidationError> {
        Ok(Self {
            value: IntervalValue::new(value)?,
            unit,
        })
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.value.get()) * self.unit.seconds())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.get();
        write!(f, "{} {}", value, self.unit.label(value != 1))
    }
}

/// Countdown bookkeeping shared by the main reminder and custom interval
/// reminders.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSchedule {
    pub interval: Interval,
    pub next_trigger_time: Option<DateTime<Utc>>,
    /// Remaining time frozen at the instant the global timer was paused.
    pub paused_remaining: Option<TimeDelta>,
    /// Remaining time held while the active window is closed.
    pub waiting_remaining: Option<TimeDelta>,
}

impl IntervalSchedule {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            next_trigger_time: None,
            paused_remaining: None,
            waiting_remaining: None,
        }
    }

    pub fn armed(interval: Interval, now: DateTime<Utc>) -> Self {
        let mut schedule = Self::new(interval);
        schedule.arm(now);
        schedule
    }

    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.next_trigger_time = Some(now + self.interval.duration());
        self.paused_remaining = None;
        self.waiting_remaining = None;
    }

    pub fn ensure_armed(&mut self, now: DateTime<Utc>) {
        if self.next_trigger_time.is_none() {
            self.arm(now);
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.paused_remaining.is_none() {
            self.paused_remaining = Some(self.remaining(now));
            self.waiting_remaining = None;
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.next_trigger_time = Some(now + remaining);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_remaining.is_some()
    }

    /// Stops the countdown while the active window is closed. Repeated calls
    /// keep the first captured value.
    pub fn hold(&mut self, now: DateTime<Utc>) {
        if self.waiting_remaining.is_none() {
            self.waiting_remaining = Some(self.remaining(now));
        }
    }

    /// Continues a held countdown from where [`Self::hold`] stopped it.
    pub fn release(&mut self, now: DateTime<Utc>) {
        if let Some(remaining) = self.waiting_remaining.take() {
            self.next_trigger_time = Some(now + remaining);
        }
    }

    pub fn is_held(&self) -> bool {
        self.waiting_remaining.is_some()
    }

    /// Time left until the next fire, never negative. An unarmed schedule
    /// reports its full interval.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        if let Some(frozen) = self.paused_remaining.or(self.waiting_remaining) {
            return frozen;
        }

        match self.next_trigger_time {
            Some(next) => (next - now).max(TimeDelta::zero()),
            None => self.interval.duration(),
        }
    }

    /// Applies a new interval. An armed countdown restarts with the new
    /// length, a paused one keeps being paused at the new full length.
    pub fn set_interval(&mut self, interval: Interval, now: DateTime<Utc>) {
        if interval == self.interval {
            return;
        }

        self.interval = interval;
        if self.paused_remaining.is_some() {
            self.paused_remaining = Some(interval.duration());
        } else if self.waiting_remaining.is_some() {
            self.waiting_remaining = Some(interval.duration());
        } else if self.next_trigger_time.is_some() {
            self.arm(now);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderType {
    Main,
    Interval,
    OneTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReminderKind {
    Interval(IntervalSchedule),
    OneTime { target_date_time: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomReminder {
    pub id: ReminderId,
    /// Raw title as typed by the user, may contain literal `\n` escapes.
    pub title: String,
    pub enabled: bool,
    pub kind: ReminderKind,
}

impl CustomReminder {
    pub fn display_title(&self) -> String {
        expand_escapes(&self.title)
    }

    pub fn reminder_type(&self) -> ReminderType {
        match self.kind {
            ReminderKind::Interval(_) => ReminderType::Interval,
            ReminderKind::OneTime { .. } => ReminderType::OneTime,
        }
    }

    pub fn schedule(&self) -> Option<&IntervalSchedule> {
        match &self.kind {
            ReminderKind::Interval(schedule) => Some(schedule),
            ReminderKind::OneTime { .. } => None,
        }
    }

    pub fn schedule_mut(&mut self) -> Option<&mut IntervalSchedule> {
        match &mut self.kind {
            ReminderKind::Interval(schedule) => Some(schedule),
            ReminderKind::OneTime { .. } => None,
        }
    }

    pub fn target_date_time(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            ReminderKind::OneTime { target_date_time } => Some(target_date_time),
            ReminderKind::Interval(_) => None,
        }
    }

    /// A disabled one-time reminder whose moment has already passed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        !self.enabled
            && self
                .target_date_time()
                .is_some_and(|target| target <= now)
    }

    /// Body text shown under the title when the reminder fires.
    pub fn alert_message(&self) -> String {
        match &self.kind {
            ReminderKind::Interval(schedule) => format!("Repeats every {}", schedule.interval),
            ReminderKind::OneTime { target_date_time } => {
                format!("Scheduled for {}", target_date_time.format("%Y-%m-%d %H:%M UTC"))
            }
        }
    }
}

/// The always-present global reminder driven by the start/pause button.
#[derive(Debug, Clone, PartialEq)]
pub struct MainReminder {
    pub schedule: IntervalSchedule,
    pub message_prefix: String,
    pub message_suffix: String,
}

impl MainReminder {
    pub fn new(settings: MainReminderSettings) -> Self {
        Self {
            schedule: IntervalSchedule::new(settings.interval),
            message_prefix: settings.message_prefix,
            message_suffix: settings.message_suffix,
        }
    }

    pub fn message(&self) -> String {
        format!(
            "{}{}{}",
            expand_escapes(&self.message_prefix),
            self.schedule.interval,
            expand_escapes(&self.message_suffix)
        )
    }

    pub fn settings(&self) -> MainReminderSettings {
        MainReminderSettings {
            interval: self.schedule.interval,
            message_prefix: self.message_prefix.clone(),
            message_suffix: self.message_suffix.clone(),
        }
    }
}

impl Default for MainReminder {
    fn default() -> Self {
        Self::new(MainReminderSettings::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainReminderSettings {
    pub interval: Interval,
    pub message_prefix: String,
    pub message_suffix: String,
}

impl Default for MainReminderSettings {
    fn default() -> Self {
        Self {
            interval: Interval {
                value: IntervalValue::clamped(DEFAULT_MAIN_INTERVAL),
                unit: IntervalUnit::Minutes,
            },
            message_prefix: DEFAULT_MESSAGE_PREFIX.to_owned(),
            message_suffix: DEFAULT_MESSAGE_SUFFIX.to_owned(),
        }
    }
}

/// Titles and messages are stored with literal `\n` sequences.
pub fn expand_escapes(text: &str) -> String {
    text.replace("\\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + seconds, 0).unwrap()
    }

    fn minutes(value: u32) -> Interval {
        Interval::new(value, IntervalUnit::Minutes).unwrap()
    }

    #[test]
    fn interval_value_rejects_out_of_range() {
        assert!(IntervalValue::new(0).is_err());
        assert!(IntervalValue::new(100_000).is_err());
        assert_eq!(IntervalValue::new(99_999).unwrap().get(), 99_999);
        assert_eq!(IntervalValue::clamped(0).get(), 1);
    }

    #[test]
    fn interval_duration_respects_unit() {
        assert_eq!(
            Interval::new(90, IntervalUnit::Seconds).unwrap().duration(),
            TimeDelta::seconds(90)
        );
        assert_eq!(minutes(2).duration(), TimeDelta::seconds(120));
        assert_eq!(
            Interval::new(1, IntervalUnit::Hours).unwrap().to_string(),
            "1 hour"
        );
    }

    #[test]
    fn pause_and_resume_keep_remaining_time() {
        let mut schedule = IntervalSchedule::armed(minutes(10), at(0));

        schedule.pause(at(240));
        assert_eq!(schedule.remaining(at(10_000)), TimeDelta::seconds(360));

        schedule.resume(at(10_000));
        assert!(!schedule.is_paused());
        assert_eq!(schedule.next_trigger_time, Some(at(10_360)));
    }

    #[test]
    fn held_countdown_survives_until_release() {
        let mut schedule = IntervalSchedule::armed(minutes(10), at(0));

        schedule.hold(at(120));
        schedule.hold(at(500));
        assert!(schedule.is_held());
        assert_eq!(schedule.remaining(at(50_000)), TimeDelta::seconds(480));

        schedule.release(at(50_000));
        assert!(!schedule.is_held());
        assert_eq!(schedule.next_trigger_time, Some(at(50_480)));
    }

    #[test]
    fn arming_drops_held_countdown() {
        let mut schedule = IntervalSchedule::armed(minutes(10), at(0));
        schedule.hold(at(120));

        schedule.arm(at(1_000));

        assert!(!schedule.is_held());
        assert_eq!(schedule.remaining(at(1_000)), TimeDelta::seconds(600));
    }

    #[test]
    fn changing_interval_restarts_armed_countdown() {
        let mut schedule = IntervalSchedule::armed(minutes(10), at(0));

        schedule.set_interval(minutes(5), at(100));

        assert_eq!(schedule.next_trigger_time, Some(at(400)));
    }

    #[test]
    fn unarmed_schedule_stays_unarmed_on_interval_change() {
        let mut schedule = IntervalSchedule::new(minutes(10));

        schedule.set_interval(minutes(5), at(100));

        assert_eq!(schedule.next_trigger_time, None);
        assert_eq!(schedule.remaining(at(100)), TimeDelta::seconds(300));
    }

    #[test]
    fn main_message_expands_escapes() {
        let main = MainReminder::new(MainReminderSettings {
            interval: minutes(30),
            message_prefix: "Sat for ".to_owned(),
            message_suffix: "\\nMove!".to_owned(),
        });

        assert_eq!(main.message(), "Sat for 30 minutes\nMove!");
    }

    #[test]
    fn disabled_past_one_time_reminder_is_stale() {
        let mut reminder = CustomReminder {
            id: ReminderId::generate(),
            title: "Call".to_owned(),
            enabled: true,
            kind: ReminderKind::OneTime {
                target_date_time: at(60),
            },
        };

        assert!(!reminder.is_stale(at(120)));
        reminder.enabled = false;
        assert!(!reminder.is_stale(at(30)));
        assert!(reminder.is_stale(at(60)));
    }
}
