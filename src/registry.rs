use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    error::{Result, SchedulerError, ValidationError},
    reminder::{
        CustomReminder, Interval, IntervalSchedule, IntervalUnit, MainReminder,
        MainReminderSettings, ReminderId, ReminderKind,
    },
};

/// Input for creating a reminder, or for replacing one through an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub title: String,
    pub kind: NewReminderKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewReminderKind {
    Interval { value: u32, unit: IntervalUnit },
    OneTime { target_date_time: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Enabled,
    Disabled,
    /// Re-enabled a one-time reminder whose moment already passed, so it was
    /// removed instead.
    Dropped,
}

/// Authoritative copy of every reminder definition: the main reminder plus
/// custom reminders in creation order.
#[derive(Debug, Clone, Default)]
pub struct ReminderRegistry {
    main: MainReminder,
    custom: IndexMap<ReminderId, CustomReminder>,
}

impl ReminderRegistry {
    pub fn new(main: MainReminder) -> Self {
        Self {
            main,
            custom: IndexMap::new(),
        }
    }

    /// Builds a registry from definitions loaded elsewhere, keeping their
    /// ids and schedules as they are.
    pub fn from_parts(main: MainReminder, custom: impl IntoIterator<Item = CustomReminder>) -> Self {
        Self {
            main,
            custom: custom
                .into_iter()
                .map(|reminder| (reminder.id.clone(), reminder))
                .collect(),
        }
    }

    pub fn main(&self) -> &MainReminder {
        &self.main
    }

    pub fn main_mut(&mut self) -> &mut MainReminder {
        &mut self.main
    }

    pub fn get(&self, id: &ReminderId) -> Option<&CustomReminder> {
        self.custom.get(id)
    }

    pub fn get_mut(&mut self, id: &ReminderId) -> Option<&mut CustomReminder> {
        self.custom.get_mut(id)
    }

    pub fn contains(&self, id: &ReminderId) -> bool {
        id.is_main() || self.custom.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomReminder> {
        self.custom.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CustomReminder> {
        self.custom.values_mut()
    }

    pub fn ids(&self) -> Vec<ReminderId> {
        self.custom.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.custom.is_empty()
    }

    pub fn create(&mut self, new_reminder: NewReminder, now: DateTime<Utc>) -> Result<ReminderId> {
        let (title, kind) = validate(new_reminder, now)?;
        let id = ReminderId::generate();
        let reminder = CustomReminder {
            id: id.clone(),
            title,
            enabled: true,
            kind,
        };

        log::info!(
            "Created reminder [reminder_id = {}, kind = {:?}]",
            id,
            reminder.reminder_type()
        );
        self.custom.insert(id.clone(), reminder);
        Ok(id)
    }

    /// Replaces title and schedule of an existing reminder. The id is kept,
    /// the countdown restarts and the reminder comes back enabled.
    pub fn update(
        &mut self,
        id: &ReminderId,
        new_reminder: NewReminder,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if id.is_main() {
            return Err(SchedulerError::MainReminderNotEditable);
        }

        let reminder = self
            .custom
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;
        let (title, kind) = validate(new_reminder, now)?;

        reminder.title = title;
        reminder.kind = kind;
        reminder.enabled = true;

        log::info!("Updated reminder [reminder_id = {}]", id);
        Ok(())
    }

    pub fn delete(&mut self, id: &ReminderId) -> Result<CustomReminder> {
        if id.is_main() {
            return Err(SchedulerError::MainReminderNotEditable);
        }

        let removed = self
            .custom
            .shift_remove(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;

        log::info!("Deleted reminder [reminder_id = {}]", id);
        Ok(removed)
    }

    /// Removes a custom reminder if it is still registered.
    pub fn take(&mut self, id: &ReminderId) -> Option<CustomReminder> {
        self.custom.shift_remove(id)
    }

    pub fn toggle(&mut self, id: &ReminderId, now: DateTime<Utc>) -> Result<ToggleOutcome> {
        if id.is_main() {
            return Err(SchedulerError::MainReminderNotEditable);
        }

        let reminder = self
            .custom
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;

        if reminder.enabled {
            reminder.enabled = false;
            log::info!("Disabled reminder [reminder_id = {}]", id);
            return Ok(ToggleOutcome::Disabled);
        }

        match &mut reminder.kind {
            ReminderKind::OneTime { target_date_time } if *target_date_time <= now => {
                log::debug!(
                    "Dropping stale one-time reminder on enable [reminder_id = {}, target = {}]",
                    id,
                    target_date_time
                );
                self.custom.shift_remove(id);
                return Ok(ToggleOutcome::Dropped);
            }
            ReminderKind::OneTime { .. } => {}
            ReminderKind::Interval(schedule) => schedule.ensure_armed(now),
        }

        reminder.enabled = true;
        log::info!("Enabled reminder [reminder_id = {}]", id);
        Ok(ToggleOutcome::Enabled)
    }

    pub fn set_main_settings(&mut self, settings: MainReminderSettings, now: DateTime<Utc>) {
        self.main.schedule.set_interval(settings.interval, now);
        self.main.message_prefix = settings.message_prefix;
        self.main.message_suffix = settings.message_suffix;
    }

    /// Removes disabled one-time reminders whose moment has passed.
    pub fn remove_stale(&mut self, now: DateTime<Utc>) -> Vec<ReminderId> {
        let stale: Vec<ReminderId> = self
            .custom
            .values()
            .filter(|reminder| reminder.is_stale(now))
            .map(|reminder| reminder.id.clone())
            .collect();

        for id in &stale {
            log::debug!("Dropping stale one-time reminder [reminder_id = {}]", id);
            self.custom.shift_remove(id);
        }

        stale
    }

    /// Order used by the reminder list: interval reminders first (enabled
    /// ones by next fire time, disabled ones by interval length), then
    /// one-time reminders by target time.
    pub fn sorted_for_display(&self) -> Vec<&CustomReminder> {
        let mut reminders: Vec<&CustomReminder> = self.custom.values().collect();
        reminders.sort_by(|a, b| display_order(a, b));
        reminders
    }
}

fn display_order(a: &CustomReminder, b: &CustomReminder) -> Ordering {
    match (&a.kind, &b.kind) {
        (ReminderKind::Interval(_), ReminderKind::OneTime { .. }) => Ordering::Less,
        (ReminderKind::OneTime { .. }, ReminderKind::Interval(_)) => Ordering::Greater,
        (ReminderKind::Interval(left), ReminderKind::Interval(right)) => {
            b.enabled.cmp(&a.enabled).then_with(|| {
                if a.enabled {
                    cmp_missing_last(left.next_trigger_time, right.next_trigger_time)
                } else {
                    left.interval.duration().cmp(&right.interval.duration())
                }
            })
        }
        (
            ReminderKind::OneTime {
                target_date_time: left,
            },
            ReminderKind::OneTime {
                target_date_time: right,
            },
        ) => left.cmp(right),
    }
}

fn cmp_missing_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn validate(
    new_reminder: NewReminder,
    now: DateTime<Utc>,
) -> Result<(String, ReminderKind), ValidationError> {
    if new_reminder.title.trim().is_empty() {
        return Err(ValidationError::BlankTitle);
    }

    let kind = match new_reminder.kind {
        NewReminderKind::Interval { value, unit } => {
            ReminderKind::Interval(IntervalSchedule::armed(Interval::new(value, unit)?, now))
        }
        NewReminderKind::OneTime { target_date_time } => {
            if target_date_time <= now {
                return Err(ValidationError::TargetNotInFuture {
                    target: target_date_time,
                    now,
                });
            }
            ReminderKind::OneTime { target_date_time }
        }
    };

    Ok((new_reminder.title, kind))
}
