//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Webhook sink; absent disables delivery
    #[serde(default)]
    pub webhook: Option<RawWebhook>,

    /// Monitored subjects
    #[serde(default)]
    pub subjects: Vec<RawSubject>,

    /// Named multi-subject profiles
    #[serde(default)]
    pub profiles: Vec<RawProfile>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Schedule evaluation interval (default: 60)
    pub check_interval_seconds: Option<u64>,

    /// Audit log retention window (default: 30)
    pub retention_days: Option<u32>,
}

/// A boolean that may arrive as a real bool or a truthy string ("true", "1", "yes", "on")
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawFlag {
    Bool(bool),
    Text(String),
}

impl From<bool> for RawFlag {
    fn from(b: bool) -> Self {
        RawFlag::Bool(b)
    }
}

/// Block flags; any omitted flag means "allowed"
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSettings {
    pub block_recording: Option<RawFlag>,
    pub block_events: Option<RawFlag>,
    pub block_streaming: Option<RawFlag>,
    pub block_detection: Option<RawFlag>,
    pub block_motion_alerts: Option<RawFlag>,
}

/// Per-subject schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSchedule {
    #[serde(default)]
    pub enabled: Option<RawFlag>,

    /// "daily", "weekdays", "weekends", or "custom"
    #[serde(rename = "type", default = "default_schedule_type")]
    pub kind: String,

    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format)
    pub end: String,

    /// Day numbers 0 (Sunday) to 6 (Saturday); custom schedules only
    #[serde(default)]
    pub days: Vec<i64>,

    #[serde(default)]
    pub settings: RawSettings,
}

fn default_schedule_type() -> String {
    "daily".to_string()
}

/// Raw subject definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSubject {
    /// Unique stable ID
    pub id: String,

    /// Display name (defaults to the ID)
    pub name: Option<String>,

    /// Whether the policy applies to this subject at all (default: true)
    #[serde(default)]
    pub enabled: Option<RawFlag>,

    /// "indicator_flag" (default) or "privacy_mode"
    pub recording_block: Option<String>,

    /// Manual baseline settings
    #[serde(default)]
    pub manual: Option<RawSettings>,

    #[serde(default)]
    pub schedule: Option<RawSchedule>,
}

/// Raw profile definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawProfile {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub members: Vec<String>,

    #[serde(default)]
    pub active: Option<RawFlag>,

    #[serde(default)]
    pub settings: RawSettings,
}

/// Webhook sink
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawWebhook {
    pub url: String,

    /// Subscribed event kinds (default: all)
    pub events: Option<Vec<String>>,

    /// Include camera name and id in payloads (default: true)
    #[serde(default)]
    pub include_camera_details: Option<RawFlag>,

    /// Extra headers sent with every delivery
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds (default: 10)
    pub timeout_seconds: Option<u64>,
}
