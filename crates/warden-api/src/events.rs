//! Webhook payload sent to the external notification sink

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_util::SubjectId;

use crate::{EventKind, PolicySettings, Trigger};

/// JSON body of one webhook POST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub event: EventKind,

    /// ISO-8601 UTC timestamp
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,

    #[serde(rename = "cameraId", default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<SubjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<PolicySettings>,

    pub trigger: Trigger,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl NotificationPayload {
    pub fn new<Tz: TimeZone>(event: EventKind, trigger: Trigger, at: &DateTime<Tz>) -> Self {
        Self {
            event,
            timestamp: iso_timestamp(at),
            camera: None,
            camera_id: None,
            profile: None,
            settings: None,
            trigger,
            details: None,
        }
    }

    pub fn with_subject(mut self, id: SubjectId, name: impl Into<String>) -> Self {
        self.camera_id = Some(id);
        self.camera = Some(name.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_settings(mut self, settings: PolicySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Drop subject identification (operator opted out of camera details)
    pub fn without_subject(mut self) -> Self {
        self.camera = None;
        self.camera_id = None;
        self
    }
}

/// RFC 3339 UTC timestamp with millisecond precision, e.g. `2025-12-25T14:30:00.000Z`
pub fn iso_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
