//! Schedule, profile, and delivery configuration shared across crates

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::Duration;
use warden_util::{day_name, DaysOfWeek, ProfileId, SubjectId, WallClock};

use crate::{EventKind, PolicySettings};

/// Recurrence pattern of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Daily,
    Weekdays,
    Weekends,
    Custom,
}

impl ScheduleKind {
    /// Days implied by the kind; `None` for `Custom`, whose days are explicit
    pub fn derived_days(&self) -> Option<DaysOfWeek> {
        match self {
            ScheduleKind::Daily => Some(DaysOfWeek::ALL_DAYS),
            ScheduleKind::Weekdays => Some(DaysOfWeek::WEEKDAYS),
            ScheduleKind::Weekends => Some(DaysOfWeek::WEEKENDS),
            ScheduleKind::Custom => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekdays => "weekdays",
            ScheduleKind::Weekends => "weekends",
            ScheduleKind::Custom => "custom",
        }
    }
}

/// Per-subject recurring time window during which `settings` apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub start_time: WallClock,
    pub end_time: WallClock,
    /// Only authoritative when `kind` is `Custom`
    #[serde(default)]
    pub days: DaysOfWeek,
    pub settings: PolicySettings,
}

impl Schedule {
    /// An enabled schedule whose days follow from `kind`
    pub fn new(
        kind: ScheduleKind,
        start_time: WallClock,
        end_time: WallClock,
        settings: PolicySettings,
    ) -> Self {
        Self {
            enabled: true,
            kind,
            start_time,
            end_time,
            days: kind.derived_days().unwrap_or(DaysOfWeek::NONE),
            settings,
        }
    }

    /// An enabled schedule on an explicit set of days
    pub fn custom(
        days: DaysOfWeek,
        start_time: WallClock,
        end_time: WallClock,
        settings: PolicySettings,
    ) -> Self {
        Self {
            enabled: true,
            kind: ScheduleKind::Custom,
            start_time,
            end_time,
            days,
            settings,
        }
    }

    /// Days the window applies on. Ignores `days` unless the kind is `Custom`.
    pub fn applicable_days(&self) -> DaysOfWeek {
        self.kind.derived_days().unwrap_or(self.days)
    }

    /// Whether the window wraps past midnight (e.g. 22:00-06:00)
    pub fn spans_midnight(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Human-readable summary, e.g. `Weekdays 22:00-06:00 (overnight)`
    pub fn describe(&self) -> String {
        if !self.enabled {
            return "Disabled".to_string();
        }

        let days = match self.kind {
            ScheduleKind::Daily => "Daily".to_string(),
            ScheduleKind::Weekdays => "Weekdays".to_string(),
            ScheduleKind::Weekends => "Weekends".to_string(),
            ScheduleKind::Custom => {
                let names: Vec<_> = self.days.indices().map(day_name).collect();
                if names.is_empty() {
                    "No days".to_string()
                } else {
                    names.join(", ")
                }
            }
        };

        let mut out = format!("{} {}-{}", days, self.start_time, self.end_time);
        if self.spans_midnight() {
            out.push_str(" (overnight)");
        }
        out
    }
}

/// Named group of subjects that share one policy while active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub member_ids: BTreeSet<SubjectId>,
    pub settings: PolicySettings,
    pub active: bool,
}

impl Profile {
    pub fn is_member(&self, subject: &SubjectId) -> bool {
        self.member_ids.contains(subject)
    }
}

/// How a device suppresses recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingBlockStrategy {
    /// Toggle a local "recording allowed" indicator consulted by the recorder
    #[default]
    IndicatorFlag,
    /// Set the device's own recording privacy mode
    PrivacyMode,
}

impl RecordingBlockStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingBlockStrategy::IndicatorFlag => "indicator_flag",
            RecordingBlockStrategy::PrivacyMode => "privacy_mode",
        }
    }
}

impl fmt::Display for RecordingBlockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default webhook request timeout
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default schedule evaluation interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default audit retention window in days
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Where and what to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub events: HashSet<EventKind>,
    pub include_camera_details: bool,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Subscribe to every event kind with default options
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events: EventKind::ALL.into_iter().collect(),
            include_camera_details: true,
            headers: BTreeMap::new(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = EventKind>) -> Self {
        self.events = events.into_iter().collect();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
