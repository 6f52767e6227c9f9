use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use chrono_tz::Tz;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::active_hours::HolidaySet;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    /// IANA name of the zone active hours are evaluated in.
    pub timezone: String,
    /// Where the settings blob is read from and saved back to.
    pub settings_path: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            timezone: "UTC".to_owned(),
            settings_path: PathBuf::from("settings.json"),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct HolidaySettings {
    pub dates: Vec<NaiveDate>,
}

impl HolidaySettings {
    pub fn calendar(&self) -> HolidaySet {
        self.dates.iter().copied().collect()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub holidays: HolidaySettings,
}

impl AppSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("appsettings").required(true))
            .add_source(File::with_name("appsettings.local").required(false));

        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings = builder
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.engine.timezone.parse::<Tz>().map_err(|err| {
            ConfigError::Message(format!(
                "Unknown timezone '{}': {}",
                self.engine.timezone, err
            ))
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_interval_ms.max(1))
    }
}
