use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    active_hours::{ActiveHoursConfig, ActiveWindowCalculator, HolidayCalendar},
    clock::Clock,
    error::{Result, SchedulerError},
    registry::{NewReminder, ReminderRegistry, ToggleOutcome},
    reminder::{
        IntervalSchedule, MainReminderSettings, ReminderId, ReminderKind, ReminderType,
        MAIN_REMINDER_TITLE,
    },
    settings::ReminderSettings,
};

use super::{
    alerts::{Alert, AlertDispatcher, AlertEvent, AlertSnapshot},
    common::{GlobalTimerState, TimerRuntime, TimerState, TimerStatus},
};

#[cfg(test)]
mod tests;

/// Single-threaded reminder state machine.
///
/// Nothing in here sleeps or spawns. The owner calls [`SchedulerCore::tick`]
/// on a fixed cadence and applies commands between ticks; every call reads
/// the clock once and leaves all statuses consistent for that instant.
pub struct SchedulerCore {
    clock: Arc<dyn Clock>,
    registry: ReminderRegistry,
    window: ActiveWindowCalculator,
    dispatcher: AlertDispatcher,
    runtimes: HashMap<ReminderId, TimerRuntime>,
    global: GlobalTimerState,
    /// Last loaded blob, kept so export writes back fields we don't own.
    stored: ReminderSettings,
}

impl SchedulerCore {
    pub fn new(
        clock: Arc<dyn Clock>,
        registry: ReminderRegistry,
        window: ActiveWindowCalculator,
    ) -> Self {
        let mut core = Self {
            clock,
            registry,
            window,
            dispatcher: AlertDispatcher::new(),
            runtimes: HashMap::new(),
            global: GlobalTimerState::Stopped,
            stored: ReminderSettings::default(),
        };

        let now = core.clock.now();
        core.evaluate(now, false);
        core
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// One scheduling step: drops stale one-time reminders, applies the
    /// active window and fires everything that is due.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        for id in self.registry.remove_stale(now) {
            self.forget(&id);
        }

        self.evaluate(now, true);
    }

    /// Start, pause or resume the global timer. Returns the new state.
    pub fn toggle_timer(&mut self) -> Result<GlobalTimerState> {
        if self.window.config().enabled {
            return Err(SchedulerError::ManagedByActiveHours);
        }

        let now = self.clock.now();
        match self.global {
            GlobalTimerState::Stopped => {
                self.registry.main_mut().schedule.arm(now);
                self.global = GlobalTimerState::Running;
            }
            GlobalTimerState::Running => self.pause_all(now),
            GlobalTimerState::Paused => self.resume_all(now),
        }

        log::info!("Global timer toggled [state = {:?}]", self.global);
        self.evaluate(now, false);
        Ok(self.global)
    }

    /// Clears the alert for `id`. Interval reminders start a fresh countdown,
    /// one-time reminders are deleted.
    pub fn acknowledge(&mut self, id: &ReminderId) -> Result<()> {
        if self.dispatcher.dismiss(id).is_none() {
            return Err(SchedulerError::NoActiveAlert(id.clone()));
        }

        let now = self.clock.now();
        self.rearm_after_alert(id, now);
        self.evaluate(now, false);
        Ok(())
    }

    /// Clears the most recently raised alert, if any.
    pub fn dismiss_latest(&mut self) -> Option<ReminderId> {
        let alert = self.dispatcher.dismiss_latest()?;

        let now = self.clock.now();
        self.rearm_after_alert(&alert.id, now);
        self.evaluate(now, false);
        Some(alert.id)
    }

    pub fn create_reminder(&mut self, new_reminder: NewReminder) -> Result<ReminderId> {
        let now = self.clock.now();
        let id = self.registry.create(new_reminder, now)?;

        self.evaluate(now, false);
        Ok(id)
    }

    pub fn update_reminder(&mut self, id: &ReminderId, new_reminder: NewReminder) -> Result<()> {
        let now = self.clock.now();
        self.registry.update(id, new_reminder, now)?;

        self.dispatcher.dismiss(id);
        self.runtimes.remove(id);
        self.evaluate(now, false);
        Ok(())
    }

    pub fn delete_reminder(&mut self, id: &ReminderId) -> Result<()> {
        self.registry.delete(id)?;

        self.forget(id);
        let now = self.clock.now();
        self.evaluate(now, false);
        Ok(())
    }

    pub fn toggle_reminder(&mut self, id: &ReminderId) -> Result<ToggleOutcome> {
        let now = self.clock.now();
        let outcome = self.registry.toggle(id, now)?;

        match outcome {
            ToggleOutcome::Disabled | ToggleOutcome::Dropped => self.forget(id),
            ToggleOutcome::Enabled => {
                self.runtimes.remove(id);
            }
        }

        self.evaluate(now, false);
        Ok(outcome)
    }

    pub fn set_main_settings(&mut self, settings: MainReminderSettings) {
        let now = self.clock.now();
        self.registry.set_main_settings(settings, now);

        self.runtimes.remove(&ReminderId::main());
        self.evaluate(now, false);
    }

    pub fn set_active_hours(&mut self, config: ActiveHoursConfig) {
        log::info!(
            "Active hours updated [enabled = {}, work_mode = {:?}, ranges = {}]",
            config.enabled,
            config.work_mode,
            config.ranges.len()
        );
        self.window.set_config(config);

        let now = self.clock.now();
        self.evaluate(now, false);
    }

    pub fn set_holidays(&mut self, holidays: Arc<dyn HolidayCalendar>) {
        self.window.set_holidays(holidays);

        let now = self.clock.now();
        self.evaluate(now, false);
    }

    /// Replaces every engine-owned setting with the contents of `settings`.
    pub fn apply_settings(&mut self, settings: ReminderSettings) {
        let now = self.clock.now();

        self.registry.set_main_settings(settings.main_settings(), now);
        let mut reminders = settings.custom_reminders();
        for reminder in reminders.iter_mut().filter(|reminder| reminder.enabled) {
            if let Some(schedule) = reminder.schedule_mut() {
                schedule.ensure_armed(now);
            }
        }
        self.registry = ReminderRegistry::from_parts(self.registry.main().clone(), reminders);

        for id in self.dispatcher.ids() {
            if !self.registry.contains(&id) {
                self.dispatcher.dismiss(&id);
            }
        }
        let registry = &self.registry;
        self.runtimes.retain(|id, _| registry.contains(id));
        self.runtimes.remove(&ReminderId::main());

        self.window.set_config(settings.active_hours());
        log::info!(
            "Settings applied [custom_reminders = {}, active_hours = {}]",
            self.registry.len(),
            self.window.config().enabled
        );

        self.stored = settings;
        self.evaluate(now, false);
    }

    /// Current state in the stored blob shape, ready to be persisted.
    pub fn export_settings(&self) -> ReminderSettings {
        let mut settings = self.stored.clone();
        settings.update_from(&self.registry, self.window.config());
        settings
    }

    /// Main reminder first, then custom reminders in creation order.
    pub fn statuses(&self) -> Vec<TimerStatus> {
        std::iter::once(ReminderId::main())
            .chain(self.registry.iter().map(|reminder| reminder.id.clone()))
            .filter_map(|id| self.status(&id))
            .collect()
    }

    pub fn status(&self, id: &ReminderId) -> Option<TimerStatus> {
        let runtime = self.runtimes.get(id)?;
        Some(TimerStatus::new(
            id.clone(),
            runtime.time_left,
            runtime.total_time,
            runtime.state,
        ))
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.dispatcher.alerts()
    }

    pub fn latest_alert(&self) -> Option<Alert> {
        self.dispatcher.latest()
    }

    pub fn take_events(&mut self) -> Vec<AlertEvent> {
        self.dispatcher.take_events()
    }

    pub fn global_state(&self) -> GlobalTimerState {
        self.global
    }

    pub fn registry(&self) -> &ReminderRegistry {
        &self.registry
    }

    pub fn active_hours(&self) -> &ActiveHoursConfig {
        self.window.config()
    }

    fn forget(&mut self, id: &ReminderId) {
        self.dispatcher.dismiss(id);
        self.runtimes.remove(id);
    }

    fn pause_all(&mut self, now: DateTime<Utc>) {
        self.global = GlobalTimerState::Paused;
        self.registry.main_mut().schedule.pause(now);
        for reminder in self.registry.iter_mut().filter(|reminder| reminder.enabled) {
            if let Some(schedule) = reminder.schedule_mut() {
                schedule.pause(now);
            }
        }
    }

    fn resume_all(&mut self, now: DateTime<Utc>) {
        self.global = GlobalTimerState::Running;
        let main = &mut self.registry.main_mut().schedule;
        main.resume(now);
        main.ensure_armed(now);
        for reminder in self.registry.iter_mut() {
            if let Some(schedule) = reminder.schedule_mut() {
                schedule.resume(now);
            }
        }
    }

    fn rearm_after_alert(&mut self, id: &ReminderId, now: DateTime<Utc>) {
        let paused = self.global == GlobalTimerState::Paused;
        let rearm = |schedule: &mut IntervalSchedule| {
            if paused {
                schedule.next_trigger_time = None;
                schedule.paused_remaining = Some(schedule.interval.duration());
            } else {
                schedule.arm(now);
            }
        };

        if id.is_main() {
            rearm(&mut self.registry.main_mut().schedule);
        } else {
            match self.registry.get_mut(id).map(|reminder| &mut reminder.kind) {
                Some(ReminderKind::Interval(schedule)) => rearm(schedule),
                Some(ReminderKind::OneTime { .. }) => {
                    if self.registry.take(id).is_some() {
                        log::debug!("One-time reminder done [reminder_id = {}]", id);
                    }
                }
                None => {}
            }
        }

        self.runtimes.remove(id);
    }

    /// Recomputes every reminder's status for `now`. Only ticks fire alerts,
    /// commands just refresh the projection.
    fn evaluate(&mut self, now: DateTime<Utc>, allow_fire: bool) {
        let window_open = self.window.is_active_cached(now);

        if self.window.config().enabled && self.global != GlobalTimerState::Running {
            log::info!("Active hours manage the global timer, starting it");
            if self.global == GlobalTimerState::Paused {
                self.resume_all(now);
            } else {
                self.registry.main_mut().schedule.ensure_armed(now);
                self.global = GlobalTimerState::Running;
            }
        }

        let main_id = ReminderId::main();
        let runtime = self.evaluate_main(&main_id, now, window_open);
        self.settle(main_id, runtime, now, allow_fire);

        for id in self.registry.ids() {
            if let Some(runtime) = self.evaluate_custom(&id, now, window_open) {
                self.settle(id, runtime, now, allow_fire);
            }
        }

        let registry = &self.registry;
        self.runtimes.retain(|id, _| registry.contains(id));
    }

    fn evaluate_main(&mut self, id: &ReminderId, now: DateTime<Utc>, window_open: bool) -> TimerRuntime {
        let alerting = self.dispatcher.contains(id);
        let global = self.global;
        let schedule = &mut self.registry.main_mut().schedule;
        let total = schedule.interval.duration();

        if alerting {
            return alert_runtime(total);
        }

        match global {
            GlobalTimerState::Stopped => TimerRuntime {
                time_left: schedule.remaining(now),
                ..TimerRuntime::idle(total)
            },
            GlobalTimerState::Paused => paused_runtime(schedule, now),
            GlobalTimerState::Running => advance_interval(schedule, window_open, now),
        }
    }

    fn evaluate_custom(
        &mut self,
        id: &ReminderId,
        now: DateTime<Utc>,
        window_open: bool,
    ) -> Option<TimerRuntime> {
        let previous = self.runtimes.get(id).copied();
        let alerting = self.dispatcher.contains(id);
        let paused = self.global == GlobalTimerState::Paused;
        let reminder = self.registry.get_mut(id)?;
        let enabled = reminder.enabled;

        let runtime = match &mut reminder.kind {
            ReminderKind::Interval(schedule) => {
                let total = schedule.interval.duration();
                if alerting {
                    alert_runtime(total)
                } else if !enabled {
                    TimerRuntime {
                        time_left: schedule.remaining(now),
                        ..TimerRuntime::idle(total)
                    }
                } else if paused {
                    schedule.pause(now);
                    paused_runtime(schedule, now)
                } else {
                    advance_interval(schedule, window_open, now)
                }
            }
            ReminderKind::OneTime { target_date_time } => {
                let total = previous
                    .map(|runtime| runtime.total_time)
                    .filter(|total| *total > TimeDelta::zero())
                    .unwrap_or_else(|| (*target_date_time - now).max(TimeDelta::zero()));

                if alerting {
                    alert_runtime(total)
                } else if !enabled {
                    TimerRuntime::idle(TimeDelta::zero())
                } else if !window_open {
                    let frozen = previous
                        .and_then(|runtime| runtime.frozen)
                        .unwrap_or_else(|| (*target_date_time - now).max(TimeDelta::zero()));
                    waiting_runtime(frozen, total)
                } else {
                    TimerRuntime {
                        state: TimerState::Running,
                        time_left: *target_date_time - now,
                        total_time: total,
                        frozen: None,
                    }
                }
            }
        };

        Some(runtime)
    }

    /// Stores the runtime, firing the reminder when it is due.
    fn settle(
        &mut self,
        id: ReminderId,
        mut runtime: TimerRuntime,
        now: DateTime<Utc>,
        allow_fire: bool,
    ) {
        if runtime.state == TimerState::Running && runtime.time_left <= TimeDelta::zero() {
            if allow_fire {
                if let Some(snapshot) = self.snapshot_for(&id, now) {
                    self.dispatcher.enqueue(id.clone(), snapshot);
                    runtime = alert_runtime(runtime.total_time);
                }
            } else {
                runtime.time_left = TimeDelta::zero();
            }
        }

        self.runtimes.insert(id, runtime);
    }

    fn snapshot_for(&self, id: &ReminderId, now: DateTime<Utc>) -> Option<AlertSnapshot> {
        if id.is_main() {
            return Some(AlertSnapshot {
                title: MAIN_REMINDER_TITLE.to_owned(),
                message: self.registry.main().message(),
                reminder_type: ReminderType::Main,
                fired_at: now,
            });
        }

        self.registry.get(id).map(|reminder| AlertSnapshot {
            title: reminder.display_title(),
            message: reminder.alert_message(),
            reminder_type: reminder.reminder_type(),
            fired_at: now,
        })
    }
}

fn alert_runtime(total: TimeDelta) -> TimerRuntime {
    TimerRuntime {
        state: TimerState::AlertActive,
        time_left: TimeDelta::zero(),
        total_time: total,
        frozen: None,
    }
}

fn paused_runtime(schedule: &IntervalSchedule, now: DateTime<Utc>) -> TimerRuntime {
    TimerRuntime {
        state: TimerState::Paused,
        time_left: schedule.remaining(now),
        total_time: schedule.interval.duration(),
        frozen: None,
    }
}

fn waiting_runtime(frozen: TimeDelta, total: TimeDelta) -> TimerRuntime {
    TimerRuntime {
        state: TimerState::Waiting,
        time_left: frozen,
        total_time: total,
        frozen: Some(frozen),
    }
}

/// Countdown step for an enabled, unpaused interval schedule. While the
/// window is closed the schedule holds its remaining time; when it reopens
/// the countdown continues from the held value.
fn advance_interval(
    schedule: &mut IntervalSchedule,
    window_open: bool,
    now: DateTime<Utc>,
) -> TimerRuntime {
    let total = schedule.interval.duration();

    if !window_open {
        schedule.hold(now);
        return waiting_runtime(schedule.remaining(now), total);
    }

    if schedule.is_paused() {
        schedule.resume(now);
    }
    schedule.release(now);
    schedule.ensure_armed(now);

    let time_left = schedule
        .next_trigger_time
        .map_or(total, |next| next - now);

    TimerRuntime {
        state: TimerState::Running,
        time_left,
        total_time: total,
        frozen: None,
    }
}
