use std::{fs, io::ErrorKind, path::Path, sync::Arc};

use anyhow::Context;
use standup::{
    active_hours::{ActiveHoursConfig, ActiveWindowCalculator},
    appsettings::AppSettings,
    clock::SystemClock,
    registry::ReminderRegistry,
    scheduling::{LogAlertPresenter, ReminderEngine, SchedulerCore},
    settings::ReminderSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let app_settings = AppSettings::load().context("Failed to load appsettings")?;
    let timezone = app_settings.timezone()?;
    let holidays = app_settings.holidays.calendar();
    log::info!(
        "Starting standup [timezone = {}, holidays = {}, settings_path = {}]",
        timezone,
        holidays.len(),
        app_settings.engine.settings_path.display()
    );

    let window = ActiveWindowCalculator::new(ActiveHoursConfig::default(), Arc::new(holidays), timezone);
    let mut core = SchedulerCore::new(Arc::new(SystemClock), ReminderRegistry::default(), window);
    core.apply_settings(load_settings(&app_settings.engine.settings_path)?);

    let engine = ReminderEngine::start(
        core,
        Arc::new(LogAlertPresenter),
        app_settings.tick_interval(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    let core = engine.shutdown().await?;
    save_settings(&app_settings.engine.settings_path, &core.export_settings())?;

    Ok(())
}

fn load_settings(path: &Path) -> anyhow::Result<ReminderSettings> {
    match fs::read_to_string(path) {
        Ok(json) => ReminderSettings::from_json(&json)
            .with_context(|| format!("Malformed settings file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log::info!("No settings file yet, using defaults [path = {}]", path.display());
            Ok(ReminderSettings::default())
        }
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn save_settings(path: &Path, settings: &ReminderSettings) -> anyhow::Result<()> {
    fs::write(path, settings.to_json()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("Settings saved [path = {}]", path.display());
    Ok(())
}
