use std::sync::Arc;

use chrono::{NaiveTime, TimeZone};
use chrono_tz::Tz;
use proptest::prelude::*;

use super::*;
use crate::{
    active_hours::{HolidaySet, TimeRange, WorkMode},
    clock::ManualClock,
    registry::NewReminderKind,
    reminder::{Interval, IntervalUnit},
};

/// Wednesday, 2024-01-03 08:00 UTC.
fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()
}

fn core_with(clock: &ManualClock, config: ActiveHoursConfig) -> SchedulerCore {
    let window = ActiveWindowCalculator::new(config, Arc::new(HolidaySet::new()), Tz::UTC);
    SchedulerCore::new(Arc::new(clock.clone()), ReminderRegistry::default(), window)
}

fn core(clock: &ManualClock) -> SchedulerCore {
    core_with(clock, ActiveHoursConfig::default())
}

fn office_hours() -> ActiveHoursConfig {
    ActiveHoursConfig {
        enabled: true,
        work_mode: WorkMode::Everyday,
        ranges: vec![TimeRange::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        )],
        ..ActiveHoursConfig::default()
    }
}

fn interval(title: &str, value: u32, unit: IntervalUnit) -> NewReminder {
    NewReminder {
        title: title.to_owned(),
        kind: NewReminderKind::Interval { value, unit },
    }
}

fn one_time(title: &str, target: DateTime<Utc>) -> NewReminder {
    NewReminder {
        title: title.to_owned(),
        kind: NewReminderKind::OneTime {
            target_date_time: target,
        },
    }
}

fn state_of(core: &SchedulerCore, id: &ReminderId) -> TimerState {
    core.status(id).unwrap().status
}

#[test]
fn interval_reminder_fires_and_rearms_on_acknowledge() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);

    let id = core
        .create_reminder(interval("Stretch", 1, IntervalUnit::Minutes))
        .unwrap();
    let status = core.status(&id).unwrap();
    assert_eq!(status.status, TimerState::Running);
    assert_eq!(status.time_left_ms, 60_000);
    assert_eq!(status.total_time_ms, 60_000);

    clock.advance(TimeDelta::seconds(60));
    core.tick();

    assert_eq!(state_of(&core, &id), TimerState::AlertActive);
    assert_eq!(
        core.alerts().into_iter().map(|alert| alert.id).collect::<Vec<_>>(),
        vec![id.clone()]
    );

    core.acknowledge(&id).unwrap();

    assert_eq!(state_of(&core, &id), TimerState::Running);
    assert!(core.alerts().is_empty());
    assert_eq!(
        core.registry().get(&id).unwrap().schedule().unwrap().next_trigger_time,
        Some(start() + TimeDelta::seconds(120))
    );
}

#[test]
fn fired_alert_is_not_refired_until_acknowledged() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Stretch", 10, IntervalUnit::Seconds))
        .unwrap();

    for _ in 0..5 {
        clock.advance(TimeDelta::seconds(10));
        core.tick();
    }

    let raised = core
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, AlertEvent::Raised(alert) if alert.id == id))
        .count();
    assert_eq!(raised, 1);
    assert_eq!(core.alerts().len(), 1);
}

#[test]
fn overdue_reminder_fires_once_after_drift() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Stretch", 1, IntervalUnit::Minutes))
        .unwrap();

    clock.advance(TimeDelta::hours(3));
    core.tick();
    core.tick();

    assert_eq!(state_of(&core, &id), TimerState::AlertActive);
    assert_eq!(core.alerts().len(), 1);

    core.acknowledge(&id).unwrap();
    assert_eq!(core.status(&id).unwrap().time_left_ms, 60_000);
}

#[test]
fn commands_do_not_fire_alerts() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Stretch", 1, IntervalUnit::Minutes))
        .unwrap();

    clock.advance(TimeDelta::seconds(90));
    core.create_reminder(interval("Water", 5, IntervalUnit::Minutes))
        .unwrap();

    let status = core.status(&id).unwrap();
    assert_eq!(status.status, TimerState::Running);
    assert_eq!(status.time_left_ms, 0);
    assert!(core.alerts().is_empty());

    core.tick();
    assert_eq!(state_of(&core, &id), TimerState::AlertActive);
}

#[test]
fn reminder_waits_outside_active_hours_with_frozen_countdown() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap());
    let mut core = core_with(&clock, office_hours());
    let id = core
        .create_reminder(interval("Walk", 3, IntervalUnit::Hours))
        .unwrap();
    core.tick();
    assert_eq!(state_of(&core, &id), TimerState::Running);

    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 18, 0, 0).unwrap());
    core.tick();
    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 19, 59, 0).unwrap());
    core.tick();

    let waiting = core.status(&id).unwrap();
    assert_eq!(waiting.status, TimerState::Waiting);
    assert_eq!(waiting.time_left(), TimeDelta::hours(2));

    clock.set(Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap());
    core.tick();

    let resumed = core.status(&id).unwrap();
    assert_eq!(resumed.status, TimerState::Running);
    assert_eq!(resumed.time_left(), TimeDelta::hours(2));
    assert!(!core.alerts().iter().any(|alert| alert.id == id));

    clock.set(Utc.with_ymd_and_hms(2024, 1, 4, 11, 0, 0).unwrap());
    core.tick();
    assert_eq!(state_of(&core, &id), TimerState::AlertActive);
}

#[test]
fn waiting_main_reminder_survives_settings_changes() {
    let at = |hour, minute| Utc.with_ymd_and_hms(2024, 1, 3, hour, minute, 0).unwrap();
    let clock = ManualClock::new(at(17, 50));
    let mut core = core_with(&clock, office_hours());
    let main = ReminderId::main();
    core.tick();

    clock.set(at(18, 0));
    core.tick();
    let waiting = core.status(&main).unwrap();
    assert_eq!(waiting.status, TimerState::Waiting);
    assert_eq!(waiting.time_left_ms, 2_100_000);

    clock.set(at(18, 30));
    let current = core.registry().main().settings();
    core.set_main_settings(MainReminderSettings {
        message_prefix: "Seated for ".to_owned(),
        ..current
    });
    assert_eq!(core.status(&main).unwrap().time_left(), TimeDelta::minutes(35));

    clock.set(at(19, 0));
    let mut settings = core.export_settings();
    settings
        .extra
        .insert("theme".to_owned(), serde_json::json!("dark"));
    core.apply_settings(settings);
    core.tick();
    let waiting = core.status(&main).unwrap();
    assert_eq!(waiting.status, TimerState::Waiting);
    assert_eq!(waiting.time_left(), TimeDelta::minutes(35));

    clock.set(Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap());
    core.tick();
    let resumed = core.status(&main).unwrap();
    assert_eq!(resumed.status, TimerState::Running);
    assert_eq!(resumed.time_left(), TimeDelta::minutes(35));
    assert!(core.alerts().is_empty());
}

#[test]
fn waiting_interval_reminder_survives_reload() {
    let at = |hour, minute| Utc.with_ymd_and_hms(2024, 1, 3, hour, minute, 0).unwrap();
    let clock = ManualClock::new(at(17, 30));
    let mut core = core_with(&clock, office_hours());
    let id = core
        .create_reminder(interval("Walk", 1, IntervalUnit::Hours))
        .unwrap();

    clock.set(at(18, 0));
    core.tick();
    assert_eq!(core.status(&id).unwrap().time_left(), TimeDelta::minutes(30));

    clock.set(at(22, 0));
    let exported = core.export_settings();
    assert_eq!(
        exported.custom_reminders[0].waiting_remaining_time,
        Some(TimeDelta::minutes(30).num_milliseconds())
    );

    let mut reloaded = core_with(&clock, office_hours());
    reloaded.apply_settings(exported);
    reloaded.tick();
    let waiting = reloaded.status(&id).unwrap();
    assert_eq!(waiting.status, TimerState::Waiting);
    assert_eq!(waiting.time_left(), TimeDelta::minutes(30));

    clock.set(Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap());
    reloaded.tick();
    assert_eq!(state_of(&reloaded, &id), TimerState::Running);
    assert_eq!(reloaded.status(&id).unwrap().time_left(), TimeDelta::minutes(30));
    assert!(reloaded.alerts().is_empty());
}

#[test]
fn overdue_one_time_reminder_fires_when_window_reopens() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap());
    let mut core = core_with(&clock, office_hours());
    let id = core
        .create_reminder(one_time(
            "Call",
            Utc.with_ymd_and_hms(2024, 1, 3, 20, 0, 0).unwrap(),
        ))
        .unwrap();

    clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 21, 0, 0).unwrap());
    core.tick();
    assert_eq!(state_of(&core, &id), TimerState::Waiting);
    assert!(core.alerts().is_empty());

    clock.set(Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap());
    core.tick();
    assert_eq!(state_of(&core, &id), TimerState::AlertActive);
}

#[test]
fn active_hours_manage_the_global_timer() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap());
    let mut core = core_with(&clock, office_hours());

    core.tick();

    assert_eq!(core.global_state(), GlobalTimerState::Running);
    assert_eq!(state_of(&core, &ReminderId::main()), TimerState::Running);
    assert_eq!(core.toggle_timer(), Err(SchedulerError::ManagedByActiveHours));
}

#[test]
fn toggle_timer_cycles_start_pause_resume() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let main = ReminderId::main();
    assert_eq!(state_of(&core, &main), TimerState::Idle);

    assert_eq!(core.toggle_timer(), Ok(GlobalTimerState::Running));
    clock.advance(TimeDelta::minutes(15));
    core.tick();
    assert_eq!(core.status(&main).unwrap().time_left(), TimeDelta::minutes(30));

    assert_eq!(core.toggle_timer(), Ok(GlobalTimerState::Paused));
    clock.advance(TimeDelta::hours(2));
    core.tick();
    let paused = core.status(&main).unwrap();
    assert_eq!(paused.status, TimerState::Paused);
    assert_eq!(paused.time_left(), TimeDelta::minutes(30));
    assert!(core.alerts().is_empty());

    assert_eq!(core.toggle_timer(), Ok(GlobalTimerState::Running));
    assert_eq!(core.status(&main).unwrap().time_left(), TimeDelta::minutes(30));
}

#[test]
fn main_alert_keeps_snapshot_after_settings_change() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    core.toggle_timer().unwrap();

    clock.advance(TimeDelta::minutes(45));
    core.tick();
    core.set_main_settings(MainReminderSettings {
        interval: Interval::new(5, IntervalUnit::Minutes).unwrap(),
        message_prefix: "Changed ".to_owned(),
        message_suffix: String::new(),
    });

    let alert = core.latest_alert().unwrap();
    assert_eq!(alert.id, ReminderId::main());
    assert_eq!(alert.snapshot.title, MAIN_REMINDER_TITLE);
    assert_eq!(alert.snapshot.reminder_type, ReminderType::Main);
    assert!(alert.snapshot.message.contains("45 minutes"));
    assert_eq!(alert.snapshot.fired_at, start() + TimeDelta::minutes(45));
}

#[test]
fn simultaneous_fires_queue_in_creation_order() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let first = core
        .create_reminder(interval("First", 1, IntervalUnit::Minutes))
        .unwrap();
    let second = core
        .create_reminder(one_time("Second", start() + TimeDelta::seconds(30)))
        .unwrap();

    clock.advance(TimeDelta::minutes(1));
    core.tick();

    let queued: Vec<ReminderId> = core.alerts().into_iter().map(|alert| alert.id).collect();
    assert_eq!(queued, vec![first.clone(), second.clone()]);

    assert_eq!(core.dismiss_latest(), Some(second.clone()));
    assert_eq!(
        core.alerts().into_iter().map(|alert| alert.id).collect::<Vec<_>>(),
        vec![first]
    );
    assert!(core.registry().get(&second).is_none());
}

#[test]
fn acknowledging_one_time_reminder_deletes_it() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(one_time("Call", start() + TimeDelta::minutes(5)))
        .unwrap();

    clock.advance(TimeDelta::minutes(5));
    core.tick();
    core.acknowledge(&id).unwrap();

    assert!(core.registry().get(&id).is_none());
    assert!(core.status(&id).is_none());
    assert_eq!(core.acknowledge(&id), Err(SchedulerError::NoActiveAlert(id)));
}

#[test]
fn one_time_reminder_in_the_past_is_rejected() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);

    let result = core.create_reminder(one_time("Late", start() - TimeDelta::seconds(1)));

    assert!(matches!(result, Err(SchedulerError::Validation(_))));
    assert!(core.registry().is_empty());
}

#[test]
fn stale_disabled_one_time_reminder_vanishes_on_tick() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(one_time("Call", start() + TimeDelta::minutes(5)))
        .unwrap();
    core.toggle_reminder(&id).unwrap();
    assert_eq!(state_of(&core, &id), TimerState::Idle);

    clock.advance(TimeDelta::minutes(10));
    core.tick();

    assert!(core.registry().get(&id).is_none());
    assert!(core.alerts().is_empty());
}

#[test]
fn disabling_interval_reminder_preserves_progress() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Water", 10, IntervalUnit::Minutes))
        .unwrap();

    clock.advance(TimeDelta::minutes(4));
    assert_eq!(core.toggle_reminder(&id), Ok(ToggleOutcome::Disabled));
    assert_eq!(state_of(&core, &id), TimerState::Idle);

    clock.advance(TimeDelta::minutes(1));
    assert_eq!(core.toggle_reminder(&id), Ok(ToggleOutcome::Enabled));

    let status = core.status(&id).unwrap();
    assert_eq!(status.status, TimerState::Running);
    assert_eq!(status.time_left(), TimeDelta::minutes(5));
}

#[test]
fn toggling_reminder_while_paused_keeps_paused_time() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Water", 10, IntervalUnit::Minutes))
        .unwrap();
    core.toggle_timer().unwrap();
    core.toggle_timer().unwrap();
    assert_eq!(core.global_state(), GlobalTimerState::Paused);

    clock.advance(TimeDelta::minutes(8));
    core.toggle_reminder(&id).unwrap();
    core.toggle_reminder(&id).unwrap();
    assert_eq!(core.status(&id).unwrap().time_left(), TimeDelta::minutes(10));

    core.toggle_timer().unwrap();

    let status = core.status(&id).unwrap();
    assert_eq!(status.status, TimerState::Running);
    assert_eq!(status.time_left(), TimeDelta::minutes(10));
}

#[test]
fn deleting_reminder_clears_its_alert() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Water", 1, IntervalUnit::Minutes))
        .unwrap();
    clock.advance(TimeDelta::minutes(1));
    core.tick();
    core.take_events();

    core.delete_reminder(&id).unwrap();

    assert!(core.alerts().is_empty());
    assert_eq!(core.take_events(), vec![AlertEvent::Cleared(id.clone())]);
    assert_eq!(core.delete_reminder(&id), Err(SchedulerError::NotFound(id)));
}

#[test]
fn acknowledging_while_paused_restarts_paused_countdown() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let id = core
        .create_reminder(interval("Water", 1, IntervalUnit::Minutes))
        .unwrap();
    clock.advance(TimeDelta::minutes(1));
    core.tick();
    core.toggle_timer().unwrap();
    core.toggle_timer().unwrap();
    assert_eq!(core.global_state(), GlobalTimerState::Paused);

    core.acknowledge(&id).unwrap();

    let status = core.status(&id).unwrap();
    assert_eq!(status.status, TimerState::Paused);
    assert_eq!(status.time_left(), TimeDelta::minutes(1));
}

#[test]
fn every_live_reminder_has_exactly_one_status() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    core.create_reminder(interval("A", 1, IntervalUnit::Minutes))
        .unwrap();
    let disabled = core
        .create_reminder(interval("B", 2, IntervalUnit::Minutes))
        .unwrap();
    core.create_reminder(one_time("C", start() + TimeDelta::hours(1)))
        .unwrap();
    core.toggle_reminder(&disabled).unwrap();
    clock.advance(TimeDelta::minutes(1));
    core.tick();

    let statuses = core.statuses();
    let mut ids: Vec<ReminderId> = statuses.iter().map(|status| status.id.clone()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(statuses.len(), 4);
    assert_eq!(ids.len(), 4);
    assert_eq!(statuses[0].id, ReminderId::main());
}

#[test]
fn settings_round_trip_through_the_core() {
    let clock = ManualClock::new(start());
    let mut core = core(&clock);
    let mut settings = ReminderSettings::from_json(r#"{ "theme": "dark", "intervalValue": 20 }"#)
        .unwrap();
    settings.custom_reminders = vec![crate::settings::StoredReminder {
        id: "water".to_owned(),
        title: "Water".to_owned(),
        reminder_type: crate::settings::StoredReminderType::Interval,
        enabled: true,
        interval_value: Some(15),
        interval_unit: Some(IntervalUnit::Minutes),
        target_date_time: None,
        next_trigger_time: None,
        paused_remaining_time: None,
        waiting_remaining_time: None,
    }];

    core.apply_settings(settings);

    let water = ReminderId::from("water");
    assert_eq!(core.status(&water).unwrap().time_left(), TimeDelta::minutes(15));
    assert_eq!(
        core.registry().main().schedule.interval,
        Interval::new(20, IntervalUnit::Minutes).unwrap()
    );

    let exported = core.export_settings();
    assert_eq!(exported.extra.get("theme"), Some(&serde_json::json!("dark")));
    assert_eq!(
        exported.custom_reminders[0].next_trigger_time,
        Some((start() + TimeDelta::minutes(15)).timestamp_millis())
    );
}

proptest! {
    #[test]
    fn pause_then_resume_keeps_time_left(before in 0i64..3_599, paused_for in 0i64..1_000_000) {
        let clock = ManualClock::new(start());
        let mut core = core(&clock);
        let id = core.create_reminder(interval("Focus", 1, IntervalUnit::Hours)).unwrap();
        core.toggle_timer().unwrap();

        clock.advance(TimeDelta::seconds(before));
        core.toggle_timer().unwrap();
        let at_pause = core.status(&id).unwrap().time_left_ms;

        clock.advance(TimeDelta::seconds(paused_for));
        core.tick();
        core.toggle_timer().unwrap();

        prop_assert_eq!(core.status(&id).unwrap().time_left_ms, at_pause);
        let next = core.registry().get(&id).unwrap().schedule().unwrap().next_trigger_time;
        prop_assert!(next.is_some_and(|next| next > start()));
    }

    #[test]
    fn waiting_countdown_never_decreases(steps in proptest::collection::vec(1i64..2_000, 1..20)) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 3, 17, 50, 0).unwrap());
        let mut core = core_with(&clock, office_hours());
        let id = core.create_reminder(interval("Walk", 30, IntervalUnit::Minutes)).unwrap();

        clock.set(Utc.with_ymd_and_hms(2024, 1, 3, 18, 0, 0).unwrap());
        core.tick();
        let frozen = core.status(&id).unwrap().time_left_ms;

        for step in steps {
            clock.advance(TimeDelta::seconds(step));
            core.tick();
            let status = core.status(&id).unwrap();
            prop_assert_eq!(status.status, TimerState::Waiting);
            prop_assert_eq!(status.time_left_ms, frozen);
        }
    }
}
