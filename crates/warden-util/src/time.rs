//! Time utilities for wardend
//!
//! Provides wall-clock types for schedule windows and an injectable
//! [`Clock`] so schedule evaluation can be driven deterministically.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `WARDEN_MOCK_TIME` environment variable can be set
//! to override the system time seen by [`SystemClock`]. This is useful for
//! exercising overnight schedules without waiting for midnight.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 22:30:00`)
//!
//! Example:
//! ```bash
//! WARDEN_MOCK_TIME="2025-12-25 22:30:00" wardend
//! ```

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "WARDEN_MOCK_TIME";

/// Minutes in one day; `WallClock::minutes_from_midnight` is always below this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        ),
                    },
                    Err(_) => tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    ),
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Format a DateTime with full date and time, as used in audit exports.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Source of "now" for schedule evaluation and audit timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system time (honours `WARDEN_MOCK_TIME` in debug builds)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, dt: DateTime<Local>) {
        *self.current.lock().unwrap() = dt;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock().unwrap();
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap()
    }
}

/// Error parsing an `HH:MM` time of day
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time of day '{value}': {reason}")]
pub struct ParseWallClockError {
    pub value: String,
    pub reason: &'static str,
}

/// Time of day at minute granularity, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Parse `HH:MM` (a single-digit hour is accepted)
    pub fn parse(s: &str) -> Result<Self, ParseWallClockError> {
        let err = |reason| ParseWallClockError {
            value: s.to_string(),
            reason,
        };

        let (h, m) = s.trim().split_once(':').ok_or_else(|| err("expected HH:MM"))?;
        if m.len() != 2 {
            return Err(err("minutes must be two digits"));
        }
        let hour: u8 = h.parse().map_err(|_| err("hour is not a number"))?;
        let minute: u8 = m.parse().map_err(|_| err("minute is not a number"))?;

        Self::new(hour, minute).ok_or_else(|| err("out of range"))
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or_default()
    }

    /// Returns minutes since midnight (0..1440)
    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + (self.minute as u32)
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for WallClock {
    type Error = ParseWallClockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WallClock> for String {
    fn from(value: WallClock) -> Self {
        value.to_string()
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

/// Set of weekdays, indexed 0 = Sunday .. 6 = Saturday.
///
/// Serialized as a sorted list of day numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const SUNDAY: u8 = 1 << 0;
    pub const MONDAY: u8 = 1 << 1;
    pub const TUESDAY: u8 = 1 << 2;
    pub const WEDNESDAY: u8 = 1 << 3;
    pub const THURSDAY: u8 = 1 << 4;
    pub const FRIDAY: u8 = 1 << 5;
    pub const SATURDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: DaysOfWeek = DaysOfWeek(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: DaysOfWeek = DaysOfWeek(0x7F);
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    /// Build from day numbers; numbers outside 0..=6 are ignored
    pub fn from_indices(days: impl IntoIterator<Item = u8>) -> Self {
        Self(
            days.into_iter()
                .filter(|d| *d < 7)
                .fold(0, |mask, d| mask | (1 << d)),
        )
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.contains_index(weekday.num_days_from_sunday() as u8)
    }

    pub fn contains_index(&self, day: u8) -> bool {
        day < 7 && (self.0 & (1 << day)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Day numbers in ascending order
    pub fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        (0..7u8).filter(move |d| self.contains_index(*d))
    }
}

impl From<Vec<u8>> for DaysOfWeek {
    fn from(days: Vec<u8>) -> Self {
        Self::from_indices(days)
    }
}

impl From<DaysOfWeek> for Vec<u8> {
    fn from(days: DaysOfWeek) -> Self {
        days.indices().collect()
    }
}

/// Short English name for a day number (0 = Sunday)
pub fn day_name(day: u8) -> &'static str {
    match day {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "?",
    }
}

/// Resolve a local date and time of day to an instant.
///
/// Picks the earlier instant when a DST fold makes the time ambiguous.
/// A time inside a DST gap resolves to the first minute after the gap,
/// which is when a wall-clock comparison first sees it as passed.
pub fn local_datetime(date: NaiveDate, time: WallClock) -> Option<DateTime<Local>> {
    let mut naive = date.and_time(time.to_naive_time());
    for _ in 0..MINUTES_PER_DAY {
        if let Some(dt) = Local.from_local_datetime(&naive).earliest() {
            return Some(dt);
        }
        naive += chrono::Duration::minutes(1);
    }
    None
}

/// Day number (0 = Sunday) and minute of day for an instant
pub fn day_and_minute(dt: &DateTime<Local>) -> (u8, u32) {
    let day = dt.weekday().num_days_from_sunday() as u8;
    let minute = dt.hour() * 60 + dt.minute();
    (day, minute)
}
