//! Validated configuration structures

use crate::schema::{RawConfig, RawFlag, RawProfile, RawSchedule, RawSettings, RawSubject, RawWebhook};
use crate::validation::{parse_flag, parse_recording_block, parse_schedule_kind};
use std::path::PathBuf;
use std::time::Duration;
use warden_api::{
    DEFAULT_WEBHOOK_TIMEOUT, EventKind, PolicySettings, Profile, RecordingBlockStrategy,
    Schedule, ScheduleKind, WebhookConfig,
};
use warden_util::{DaysOfWeek, ProfileId, SubjectId, WallClock};

pub use warden_api::{DEFAULT_CHECK_INTERVAL, DEFAULT_RETENTION_DAYS};

/// Validated configuration ready for use by the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub webhook: Option<WebhookConfig>,
    pub subjects: Vec<SubjectConfig>,
    pub profiles: Vec<Profile>,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            webhook: raw.webhook.map(convert_webhook),
            subjects: raw.subjects.into_iter().map(SubjectConfig::from_raw).collect(),
            profiles: raw.profiles.into_iter().map(convert_profile).collect(),
        }
    }

    /// Get subject by ID
    pub fn get_subject(&self, id: &SubjectId) -> Option<&SubjectConfig> {
        self.subjects.iter().find(|s| &s.id == id)
    }
}

/// Service-level settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub data_dir: PathBuf,
    pub check_interval: Duration,
    pub retention_days: u32,
}

impl ServiceSettings {
    fn from_raw(raw: crate::schema::RawServiceConfig) -> Self {
        Self {
            data_dir: raw
                .data_dir
                .unwrap_or_else(warden_util::default_data_dir),
            check_interval: raw
                .check_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CHECK_INTERVAL),
            retention_days: raw.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            data_dir: warden_util::default_data_dir(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Validated subject definition
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    pub id: SubjectId,
    pub name: String,
    pub enabled: bool,
    pub recording_block: RecordingBlockStrategy,
    pub manual: PolicySettings,
    pub schedule: Option<Schedule>,
}

impl SubjectConfig {
    fn from_raw(raw: RawSubject) -> Self {
        Self {
            name: raw.name.unwrap_or_else(|| raw.id.clone()),
            id: SubjectId::new(raw.id),
            enabled: flag_or(raw.enabled.as_ref(), true),
            recording_block: raw
                .recording_block
                .as_deref()
                .and_then(|s| parse_recording_block(s).ok())
                .unwrap_or_default(),
            manual: raw.manual.as_ref().map(convert_settings).unwrap_or_default(),
            schedule: raw.schedule.map(convert_schedule),
        }
    }
}

// Conversion helpers

fn flag_or(flag: Option<&RawFlag>, default: bool) -> bool {
    flag.and_then(|f| parse_flag(f).ok()).unwrap_or(default)
}

fn convert_settings(raw: &RawSettings) -> PolicySettings {
    PolicySettings {
        block_recording: flag_or(raw.block_recording.as_ref(), false),
        block_events: flag_or(raw.block_events.as_ref(), false),
        block_streaming: flag_or(raw.block_streaming.as_ref(), false),
        block_detection: flag_or(raw.block_detection.as_ref(), false),
        block_motion_alerts: flag_or(raw.block_motion_alerts.as_ref(), false),
    }
}

fn convert_schedule(raw: RawSchedule) -> Schedule {
    let kind = parse_schedule_kind(&raw.kind).unwrap_or(ScheduleKind::Daily);
    let start = WallClock::parse(&raw.start).unwrap_or(WallClock { hour: 0, minute: 0 });
    let end = WallClock::parse(&raw.end).unwrap_or(WallClock { hour: 0, minute: 0 });
    let settings = convert_settings(&raw.settings);

    let mut schedule = match kind {
        ScheduleKind::Custom => {
            let days = raw
                .days
                .iter()
                .filter_map(|d| u8::try_from(*d).ok());
            Schedule::custom(DaysOfWeek::from_indices(days), start, end, settings)
        }
        other => Schedule::new(other, start, end, settings),
    };
    schedule.enabled = flag_or(raw.enabled.as_ref(), true);
    schedule
}

fn convert_profile(raw: RawProfile) -> Profile {
    Profile {
        id: ProfileId::new(raw.id),
        name: raw.name,
        member_ids: raw.members.into_iter().map(SubjectId::new).collect(),
        settings: convert_settings(&raw.settings),
        active: flag_or(raw.active.as_ref(), false),
    }
}

fn convert_webhook(raw: RawWebhook) -> WebhookConfig {
    let events = match raw.events {
        Some(list) => list
            .iter()
            .filter_map(|e| e.parse::<EventKind>().ok())
            .collect(),
        None => EventKind::ALL.into_iter().collect(),
    };

    WebhookConfig {
        url: raw.url.trim().to_string(),
        events,
        include_camera_details: flag_or(raw.include_camera_details.as_ref(), true),
        headers: raw.headers,
        timeout: raw
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT),
    }
}
