//! Shared types for the wardend policy model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One gated device capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyField {
    Recording,
    Events,
    Streaming,
    Detection,
    MotionAlerts,
}

impl PolicyField {
    pub const ALL: [PolicyField; 5] = [
        PolicyField::Recording,
        PolicyField::Events,
        PolicyField::Streaming,
        PolicyField::Detection,
        PolicyField::MotionAlerts,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PolicyField::Recording => "recording",
            PolicyField::Events => "events",
            PolicyField::Streaming => "streaming",
            PolicyField::Detection => "detection",
            PolicyField::MotionAlerts => "motion alerts",
        }
    }
}

/// Five independent block flags. `false` everywhere means everything passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicySettings {
    pub block_recording: bool,
    pub block_events: bool,
    pub block_streaming: bool,
    pub block_detection: bool,
    pub block_motion_alerts: bool,
}

impl PolicySettings {
    pub const ALL_ALLOWED: PolicySettings = PolicySettings {
        block_recording: false,
        block_events: false,
        block_streaming: false,
        block_detection: false,
        block_motion_alerts: false,
    };

    pub const ALL_BLOCKED: PolicySettings = PolicySettings {
        block_recording: true,
        block_events: true,
        block_streaming: true,
        block_detection: true,
        block_motion_alerts: true,
    };

    pub fn get(&self, field: PolicyField) -> bool {
        match field {
            PolicyField::Recording => self.block_recording,
            PolicyField::Events => self.block_events,
            PolicyField::Streaming => self.block_streaming,
            PolicyField::Detection => self.block_detection,
            PolicyField::MotionAlerts => self.block_motion_alerts,
        }
    }

    /// Fields whose flag differs between `self` and `other`
    pub fn changed_fields(&self, other: &PolicySettings) -> Vec<PolicyField> {
        PolicyField::ALL
            .into_iter()
            .filter(|f| self.get(*f) != other.get(*f))
            .collect()
    }

    pub fn blocked_fields(&self) -> Vec<PolicyField> {
        PolicyField::ALL.into_iter().filter(|f| self.get(*f)).collect()
    }

    pub fn is_all_allowed(&self) -> bool {
        *self == Self::ALL_ALLOWED
    }

    pub fn is_all_blocked(&self) -> bool {
        *self == Self::ALL_BLOCKED
    }
}

/// What caused a policy transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Schedule,
    Profile,
    Panic,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Schedule => "schedule",
            Trigger::Profile => "profile",
            Trigger::Panic => "panic",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Webhook event kinds an operator can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PolicyChanged,
    ProfileActivated,
    PanicMode,
    ScheduleTriggered,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::PolicyChanged,
        EventKind::ProfileActivated,
        EventKind::PanicMode,
        EventKind::ScheduleTriggered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PolicyChanged => "policy_changed",
            EventKind::ProfileActivated => "profile_activated",
            EventKind::PanicMode => "panic_mode",
            EventKind::ScheduleTriggered => "schedule_triggered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Direction of a schedule edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleEdge {
    ScheduleStart,
    ScheduleEnd,
}

impl ScheduleEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleEdge::ScheduleStart => "schedule_start",
            ScheduleEdge::ScheduleEnd => "schedule_end",
        }
    }
}

impl fmt::Display for ScheduleEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced a subject's effective policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    Override,
    Disabled,
    Profile,
    Schedule,
    Manual,
}

impl PolicySource {
    /// Audit trigger attributed to a transition produced by this source
    pub fn trigger(&self) -> Trigger {
        match self {
            PolicySource::Override => Trigger::Panic,
            PolicySource::Profile => Trigger::Profile,
            PolicySource::Schedule => Trigger::Schedule,
            PolicySource::Disabled | PolicySource::Manual => Trigger::Manual,
        }
    }
}
