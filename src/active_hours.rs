//! Work-hours calendar that gates when reminders may count down and fire.
//!
//! The calculator answers two questions for an instant: is the window open,
//! and when does that answer change next. Day eligibility comes from the
//! work mode and an optional holiday calendar, time of day from the
//! configured ranges, evaluated on the user's wall clock.

use std::{collections::HashSet, fmt, sync::Arc};

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How far ahead `next_boundary` looks before giving up.
pub const MAX_BOUNDARY_SEARCH_DAYS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkMode {
    #[default]
    Everyday,
    /// Alternating six-day and five-day weeks.
    BigSmall,
    /// Monday to Friday, both weekend days off.
    Weekend,
}

/// Half-open `[start, end)` time-of-day range. `end < start` wraps past
/// midnight, `start == end` covers nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parses a pair of `HH:MM` strings. Returns `None` when either side is
    /// blank, since unfinished rows are dropped rather than rejected.
    pub fn parse(start: &str, end: &str) -> Result<Option<Self>, ValidationError> {
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        }))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTimeOfDay(value.to_owned()))
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveHoursConfig {
    pub enabled: bool,
    pub work_mode: WorkMode,
    /// Only meaningful for [`WorkMode::BigSmall`]: Saturday is a work day.
    pub is_big_week: bool,
    pub skip_holidays: bool,
    /// Empty means the whole eligible day is active.
    pub ranges: Vec<TimeRange>,
}

/// Statutory holiday lookup. Implementations must answer from memory.
pub trait HolidayCalendar: Send + Sync + 'static {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct HolidaySet(HashSet<NaiveDate>);

impl HolidaySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<NaiveDate> for HolidaySet {
    fn from_iter<T: IntoIterator<Item = NaiveDate>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl HolidayCalendar for HolidaySet {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedWindow {
    active: bool,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
}

impl CachedWindow {
    fn covers(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && self.valid_until.is_none_or(|until| now < until)
    }
}

pub struct ActiveWindowCalculator {
    config: ActiveHoursConfig,
    holidays: Arc<dyn HolidayCalendar>,
    timezone: Tz,
    cache: Option<CachedWindow>,
}

impl ActiveWindowCalculator {
    pub fn new(config: ActiveHoursConfig, holidays: Arc<dyn HolidayCalendar>, timezone: Tz) -> Self {
        Self {
            config,
            holidays,
            timezone,
            cache: None,
        }
    }

    pub fn config(&self) -> &ActiveHoursConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn set_config(&mut self, config: ActiveHoursConfig) {
        self.config = config;
        self.cache = None;
    }

    pub fn set_holidays(&mut self, holidays: Arc<dyn HolidayCalendar>) {
        self.holidays = holidays;
        self.cache = None;
    }

    pub fn is_day_eligible(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        let by_mode = match self.config.work_mode {
            WorkMode::Everyday => true,
            WorkMode::BigSmall => match weekday {
                Weekday::Sun => false,
                Weekday::Sat => self.config.is_big_week,
                _ => true,
            },
            WorkMode::Weekend => !matches!(weekday, Weekday::Sat | Weekday::Sun),
        };

        by_mode && !(self.config.skip_holidays && self.holidays.is_holiday(date))
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }

        self.is_active_local(now.with_timezone(&self.timezone).naive_local())
    }

    fn is_active_local(&self, local: NaiveDateTime) -> bool {
        if !self.is_day_eligible(local.date()) {
            return false;
        }

        self.config.ranges.is_empty()
            || self
                .config
                .ranges
                .iter()
                .any(|range| range.contains(local.time()))
    }

    /// Earliest instant after `now` where [`Self::is_active`] changes value.
    ///
    /// Activity can only change at midnight or at a range edge, so those
    /// local times are the only candidates that need checking.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.config.enabled {
            return None;
        }

        let current = self.is_active(now);
        let cut_points = self.cut_points();
        let today = now.with_timezone(&self.timezone).date_naive();

        for offset in 0..=MAX_BOUNDARY_SEARCH_DAYS {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };

            for time in &cut_points {
                // Local times skipped by a DST jump have no instant.
                let Some(candidate) = self
                    .timezone
                    .from_local_datetime(&date.and_time(*time))
                    .earliest()
                else {
                    continue;
                };

                let candidate = candidate.with_timezone(&Utc);
                if candidate > now && self.is_active(candidate) != current {
                    return Some(candidate);
                }
            }
        }

        log::debug!(
            "No active window boundary within {} days [now = {}]",
            MAX_BOUNDARY_SEARCH_DAYS,
            now
        );
        None
    }

    /// Same answer as [`Self::is_active`], recomputed only when `now` leaves
    /// the span up to the previously computed boundary.
    pub fn is_active_cached(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(cached) = self.cache.filter(|cached| cached.covers(now)) {
            return cached.active;
        }

        let active = self.is_active(now);
        let valid_until = self.next_boundary(now);
        log::debug!(
            "Active window recomputed [active = {}, valid_until = {:?}]",
            active,
            valid_until
        );

        self.cache = Some(CachedWindow {
            active,
            valid_from: now,
            valid_until,
        });
        active
    }

    fn cut_points(&self) -> Vec<NaiveTime> {
        let mut points: Vec<NaiveTime> = std::iter::once(NaiveTime::MIN)
            .chain(
                self.config
                    .ranges
                    .iter()
                    .flat_map(|range| [range.start, range.end]),
            )
            .collect();
        points.sort();
        points.dedup();
        points
    }
}

impl fmt::Debug for ActiveWindowCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveWindowCalculator")
            .field("config", &self.config)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
