use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    active_hours::ActiveHoursConfig,
    error::SchedulerError,
    registry::{NewReminder, ToggleOutcome},
    reminder::{MainReminderSettings, ReminderId},
    settings::ReminderSettings,
};

use super::{
    alerts::Alert,
    common::{GlobalTimerState, TimerStatus},
    presenter::{AlertPresenter, present},
    scheduler::SchedulerCore,
};

const COMMAND_BUFFER: usize = 64;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type Reply<T> = oneshot::Sender<T>;
type CommandResult<T> = Result<T, SchedulerError>;

#[derive(Debug)]
enum EngineCommand {
    ToggleTimer(Reply<CommandResult<GlobalTimerState>>),
    Acknowledge(ReminderId, Reply<CommandResult<()>>),
    DismissLatest(Reply<Option<ReminderId>>),
    CreateReminder(NewReminder, Reply<CommandResult<ReminderId>>),
    UpdateReminder(ReminderId, NewReminder, Reply<CommandResult<()>>),
    DeleteReminder(ReminderId, Reply<CommandResult<()>>),
    ToggleReminder(ReminderId, Reply<CommandResult<ToggleOutcome>>),
    SetMainSettings(MainReminderSettings, Reply<()>),
    SetActiveHours(ActiveHoursConfig, Reply<()>),
    ApplySettings(ReminderSettings, Reply<()>),
    ExportSettings(Reply<ReminderSettings>),
}

/// Everything the presentation layer needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub global: GlobalTimerState,
    pub statuses: Vec<TimerStatus>,
    pub alerts: Vec<Alert>,
}

impl EngineSnapshot {
    fn capture(core: &SchedulerCore) -> Self {
        Self {
            global: core.global_state(),
            statuses: core.statuses(),
            alerts: core.alerts(),
        }
    }

    pub fn status(&self, id: &ReminderId) -> Option<&TimerStatus> {
        self.statuses.iter().find(|status| &status.id == id)
    }
}

/// Cloneable command side of a running [`ReminderEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    snapshots: watch::Receiver<EngineSnapshot>,
}

impl EngineHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> EngineCommand) -> anyhow::Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| anyhow!("Reminder engine is not running"))?;

        response
            .await
            .context("Reminder engine dropped the command")
    }

    pub async fn toggle_timer(&self) -> anyhow::Result<GlobalTimerState> {
        Ok(self.request(EngineCommand::ToggleTimer).await??)
    }

    pub async fn acknowledge(&self, id: &ReminderId) -> anyhow::Result<()> {
        let id = id.clone();
        Ok(self
            .request(|reply| EngineCommand::Acknowledge(id, reply))
            .await??)
    }

    pub async fn dismiss_latest(&self) -> anyhow::Result<Option<ReminderId>> {
        self.request(EngineCommand::DismissLatest).await
    }

    pub async fn create_reminder(&self, new_reminder: NewReminder) -> anyhow::Result<ReminderId> {
        Ok(self
            .request(|reply| EngineCommand::CreateReminder(new_reminder, reply))
            .await??)
    }

    pub async fn update_reminder(
        &self,
        id: &ReminderId,
        new_reminder: NewReminder,
    ) -> anyhow::Result<()> {
        let id = id.clone();
        Ok(self
            .request(|reply| EngineCommand::UpdateReminder(id, new_reminder, reply))
            .await??)
    }

    pub async fn delete_reminder(&self, id: &ReminderId) -> anyhow::Result<()> {
        let id = id.clone();
        Ok(self
            .request(|reply| EngineCommand::DeleteReminder(id, reply))
            .await??)
    }

    pub async fn toggle_reminder(&self, id: &ReminderId) -> anyhow::Result<ToggleOutcome> {
        let id = id.clone();
        Ok(self
            .request(|reply| EngineCommand::ToggleReminder(id, reply))
            .await??)
    }

    pub async fn set_main_settings(&self, settings: MainReminderSettings) -> anyhow::Result<()> {
        self.request(|reply| EngineCommand::SetMainSettings(settings, reply))
            .await
    }

    pub async fn set_active_hours(&self, config: ActiveHoursConfig) -> anyhow::Result<()> {
        self.request(|reply| EngineCommand::SetActiveHours(config, reply))
            .await
    }

    pub async fn apply_settings(&self, settings: ReminderSettings) -> anyhow::Result<()> {
        self.request(|reply| EngineCommand::ApplySettings(settings, reply))
            .await
    }

    pub async fn export_settings(&self) -> anyhow::Result<ReminderSettings> {
        self.request(EngineCommand::ExportSettings).await
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified after every tick and command.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }
}

/// Actor owning the [`SchedulerCore`]. Ticks and commands are applied one
/// at a time on a single task, so readers never see a half-applied change.
pub struct ReminderEngine {
    handle: EngineHandle,
    task_handle: JoinHandle<SchedulerCore>,
    cancellation_token: CancellationToken,
}

impl ReminderEngine {
    pub fn start(
        core: SchedulerCore,
        presenter: Arc<dyn AlertPresenter>,
        tick_interval: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshots) = watch::channel(EngineSnapshot::capture(&core));
        let cancellation_token = CancellationToken::new();

        let worker = EngineWorker {
            core,
            presenter,
            snapshot_tx,
        };
        let task_handle = tokio::spawn(worker.run(receiver, tick_interval, cancellation_token.clone()));

        log::info!("Reminder engine started [tick_interval = {:?}]", tick_interval);
        Self {
            handle: EngineHandle { sender, snapshots },
            task_handle,
            cancellation_token,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stops the loop and hands the core back, e.g. for a final export.
    pub async fn shutdown(self) -> anyhow::Result<SchedulerCore> {
        self.cancellation_token.cancel();

        let core = tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task_handle)
            .await
            .context("Reminder engine did not stop in time")??;

        log::info!("Reminder engine stopped");
        Ok(core)
    }
}

impl std::ops::Deref for ReminderEngine {
    type Target = EngineHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

struct EngineWorker {
    core: SchedulerCore,
    presenter: Arc<dyn AlertPresenter>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl EngineWorker {
    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<EngineCommand>,
        tick_interval: Duration,
        cancellation_token: CancellationToken,
    ) -> SchedulerCore {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::info!("Reminder engine shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.core.tick();
                    self.flush().await;
                }
                command = receiver.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        log::info!("All engine handles dropped, stopping");
                        break;
                    }
                },
            }
        }

        self.core
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        log::debug!("Engine command received [command = {:?}]", command);

        match command {
            EngineCommand::ToggleTimer(reply) => {
                let result = self.core.toggle_timer();
                self.respond(reply, result).await;
            }
            EngineCommand::Acknowledge(id, reply) => {
                let result = self.core.acknowledge(&id);
                self.respond(reply, result).await;
            }
            EngineCommand::DismissLatest(reply) => {
                let result = self.core.dismiss_latest();
                self.respond(reply, result).await;
            }
            EngineCommand::CreateReminder(new_reminder, reply) => {
                let result = self.core.create_reminder(new_reminder);
                self.respond(reply, result).await;
            }
            EngineCommand::UpdateReminder(id, new_reminder, reply) => {
                let result = self.core.update_reminder(&id, new_reminder);
                self.respond(reply, result).await;
            }
            EngineCommand::DeleteReminder(id, reply) => {
                let result = self.core.delete_reminder(&id);
                self.respond(reply, result).await;
            }
            EngineCommand::ToggleReminder(id, reply) => {
                let result = self.core.toggle_reminder(&id);
                self.respond(reply, result).await;
            }
            EngineCommand::SetMainSettings(settings, reply) => {
                self.core.set_main_settings(settings);
                self.respond(reply, ()).await;
            }
            EngineCommand::SetActiveHours(config, reply) => {
                self.core.set_active_hours(config);
                self.respond(reply, ()).await;
            }
            EngineCommand::ApplySettings(settings, reply) => {
                self.core.apply_settings(settings);
                self.respond(reply, ()).await;
            }
            EngineCommand::ExportSettings(reply) => {
                let settings = self.core.export_settings();
                self.respond(reply, settings).await;
            }
        }
    }

    /// Publishes the effects of a command before its caller hears back.
    async fn respond<T>(&mut self, reply: Reply<T>, value: T) {
        self.flush().await;
        if reply.send(value).is_err() {
            log::debug!("Engine command caller went away before the reply");
        }
    }

    async fn flush(&mut self) {
        let events = self.core.take_events();
        if !events.is_empty() {
            present(self.presenter.as_ref(), events).await;
        }

        self.snapshot_tx
            .send_replace(EngineSnapshot::capture(&self.core));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::*;
    use crate::{
        active_hours::{ActiveWindowCalculator, HolidaySet},
        clock::ManualClock,
        registry::{NewReminderKind, ReminderRegistry},
        reminder::IntervalUnit,
        scheduling::{TimerState, alerts::AlertEvent},
    };

    const TICK: Duration = Duration::from_secs(1);

    type Presented = Arc<Mutex<Vec<AlertEvent>>>;

    #[derive(Clone)]
    struct TestPresenter {
        presented: Presented,
    }

    #[async_trait]
    impl AlertPresenter for TestPresenter {
        async fn show_alert(&self, alert: &Alert) {
            self.presented
                .lock()
                .unwrap()
                .push(AlertEvent::Raised(alert.clone()));
        }

        async fn clear_alert(&self, id: &ReminderId) {
            self.presented
                .lock()
                .unwrap()
                .push(AlertEvent::Cleared(id.clone()));
        }
    }

    struct TestContext {
        clock: ManualClock,
        presented: Presented,
        engine: ReminderEngine,
    }

    impl TestContext {
        fn new() -> Self {
            let clock = ManualClock::new(start());
            let presented = Arc::new(Mutex::new(Vec::new()));
            let window = ActiveWindowCalculator::new(
                ActiveHoursConfig::default(),
                Arc::new(HolidaySet::new()),
                Tz::UTC,
            );
            let core = SchedulerCore::new(
                Arc::new(clock.clone()),
                ReminderRegistry::default(),
                window,
            );
            let presenter = TestPresenter {
                presented: presented.clone(),
            };
            let engine = ReminderEngine::start(core, Arc::new(presenter), TICK);

            Self {
                clock,
                presented,
                engine,
            }
        }

        fn raised_ids(&self) -> Vec<ReminderId> {
            self.presented
                .lock()
                .unwrap()
                .iter()
                .filter_map(|event| match event {
                    AlertEvent::Raised(alert) => Some(alert.id.clone()),
                    AlertEvent::Cleared(_) => None,
                })
                .collect()
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap()
    }

    fn every_minute(title: &str) -> NewReminder {
        NewReminder {
            title: title.to_owned(),
            kind: NewReminderKind::Interval {
                value: 1,
                unit: IntervalUnit::Minutes,
            },
        }
    }

    async fn wait_ticks(count: u32) {
        tokio::time::sleep(TICK * count).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fired_alert_reaches_presenter() {
        let ctx = TestContext::new();
        let id = ctx.engine.create_reminder(every_minute("Stretch")).await.unwrap();

        ctx.clock.advance(TimeDelta::minutes(1));
        wait_ticks(2).await;

        assert_eq!(ctx.raised_ids(), vec![id.clone()]);
        let snapshot = ctx.engine.snapshot();
        assert_eq!(snapshot.status(&id).unwrap().status, TimerState::AlertActive);
        assert_eq!(snapshot.alerts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_is_presented_before_reply() {
        let ctx = TestContext::new();
        let id = ctx.engine.create_reminder(every_minute("Stretch")).await.unwrap();
        ctx.clock.advance(TimeDelta::minutes(1));
        wait_ticks(2).await;

        ctx.engine.acknowledge(&id).await.unwrap();

        assert_eq!(
            ctx.presented.lock().unwrap().last(),
            Some(&AlertEvent::Cleared(id.clone()))
        );
        let snapshot = ctx.engine.snapshot();
        assert!(snapshot.alerts.is_empty());
        assert_eq!(snapshot.status(&id).unwrap().status, TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_errors_surface_through_the_handle() {
        let ctx = TestContext::new();
        let missing = ReminderId::from("missing");

        let err = ctx.engine.acknowledge(&missing).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<SchedulerError>(),
            Some(&SchedulerError::NoActiveAlert(missing))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_command_effects() {
        let ctx = TestContext::new();
        let mut snapshots = ctx.engine.subscribe();
        snapshots.borrow_and_update();

        ctx.engine.toggle_timer().await.unwrap();
        snapshots.changed().await.unwrap();

        assert_eq!(snapshots.borrow().global, GlobalTimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_core_for_export() {
        let ctx = TestContext::new();
        ctx.engine.create_reminder(every_minute("Stretch")).await.unwrap();

        let core = ctx.engine.shutdown().await.unwrap();

        assert_eq!(core.export_settings().custom_reminders.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_fail_after_shutdown() {
        let ctx = TestContext::new();
        let handle = ctx.engine.handle();

        ctx.engine.shutdown().await.unwrap();

        assert!(handle.toggle_timer().await.is_err());
    }
}
