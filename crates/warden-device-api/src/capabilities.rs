//! Device capabilities model

use serde::{Deserialize, Serialize};
use warden_api::PolicyField;

/// Describes what a gated device can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Records footage to a recorder
    pub can_record: bool,

    /// Exposes its own recording privacy mode
    pub has_privacy_mode: bool,

    /// Emits events (doorbell presses, sensor trips)
    pub emits_events: bool,

    /// Serves a live stream
    pub can_stream: bool,

    /// Runs object detection
    pub has_detection: bool,

    /// Raises motion alerts
    pub has_motion_alerts: bool,
}

impl DeviceCapabilities {
    /// A plain camera: everything except a native privacy mode
    pub fn camera() -> Self {
        Self {
            can_record: true,
            has_privacy_mode: false,
            emits_events: true,
            can_stream: true,
            has_detection: true,
            has_motion_alerts: true,
        }
    }

    /// A camera whose firmware can pause recording itself
    pub fn camera_with_privacy_mode() -> Self {
        Self {
            has_privacy_mode: true,
            ..Self::camera()
        }
    }

    /// A sensor with no video path
    pub fn sensor() -> Self {
        Self {
            can_record: false,
            has_privacy_mode: false,
            emits_events: true,
            can_stream: false,
            has_detection: false,
            has_motion_alerts: true,
        }
    }

    /// Whether a policy flag has anything to act on for this device
    pub fn supports(&self, field: PolicyField) -> bool {
        match field {
            PolicyField::Recording => self.can_record,
            PolicyField::Events => self.emits_events,
            PolicyField::Streaming => self.can_stream,
            PolicyField::Detection => self.has_detection,
            PolicyField::MotionAlerts => self.has_motion_alerts,
        }
    }

    pub fn supported_fields(&self) -> Vec<PolicyField> {
        PolicyField::ALL
            .into_iter()
            .filter(|f| self.supports(*f))
            .collect()
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::camera()
    }
}
