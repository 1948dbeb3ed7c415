//! Policy application over a device's detected capability set

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_api::{PolicyField, PolicySettings, RecordingBlockStrategy};

use crate::{
    DeviceAdapter, DeviceCapabilities, DeviceError, DeviceResult, RecordingBlock,
    recording_block_for,
};

/// A device wrapped with the capability set it reported at construction.
///
/// Applying a policy only touches supported capabilities; flags for
/// anything else are ignored.
pub struct GatedDevice {
    adapter: Arc<dyn DeviceAdapter>,
    capabilities: DeviceCapabilities,
    recording: Box<dyn RecordingBlock>,
}

impl GatedDevice {
    pub fn new(adapter: Arc<dyn DeviceAdapter>, strategy: RecordingBlockStrategy) -> Self {
        let capabilities = adapter.capabilities();
        let recording = recording_block_for(strategy, &capabilities);
        Self {
            adapter,
            capabilities,
            recording,
        }
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn recording_strategy(&self) -> RecordingBlockStrategy {
        self.recording.strategy()
    }

    pub fn is_healthy(&self) -> bool {
        self.adapter.is_healthy()
    }

    /// Push every supported flag to the device. Keeps going past a failing
    /// capability and reports all failures together.
    ///
    /// Returns the fields that were applied.
    pub fn apply(&self, settings: &PolicySettings) -> DeviceResult<Vec<PolicyField>> {
        let mut applied = Vec::new();
        let mut failures = Vec::new();

        for field in self.capabilities.supported_fields() {
            let blocked = settings.get(field);
            let result = match field {
                PolicyField::Recording => self.recording.apply(self.adapter.as_ref(), blocked),
                other => self.adapter.set_indicator(other, !blocked),
            };

            match result {
                Ok(()) => applied.push(field),
                Err(e) => {
                    warn!(field = field.label(), error = %e, "Failed to apply policy flag");
                    failures.push(format!("{}: {}", field.label(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(DeviceError::ApplyFailed(failures.join("; ")));
        }

        debug!(fields = applied.len(), "Policy applied to device");
        Ok(applied)
    }
}

impl fmt::Debug for GatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedDevice")
            .field("capabilities", &self.capabilities)
            .field("recording", &self.recording.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockDevice;

    #[test]
    fn only_supported_capabilities_are_touched() {
        let device = Arc::new(MockDevice::new(DeviceCapabilities::sensor()));
        let gated = GatedDevice::new(device.clone(), RecordingBlockStrategy::IndicatorFlag);

        let applied = gated.apply(&PolicySettings::ALL_BLOCKED).unwrap();
        assert_eq!(applied, vec![PolicyField::Events, PolicyField::MotionAlerts]);

        assert_eq!(device.indicator(PolicyField::Events), Some(false));
        assert_eq!(device.indicator(PolicyField::Recording), None);
        assert_eq!(device.indicator(PolicyField::Streaming), None);
    }

    #[test]
    fn privacy_mode_strategy_leaves_recording_indicator_alone() {
        let device = Arc::new(MockDevice::new(DeviceCapabilities::camera_with_privacy_mode()));
        let gated = GatedDevice::new(device.clone(), RecordingBlockStrategy::PrivacyMode);

        gated
            .apply(&PolicySettings {
                block_recording: true,
                ..PolicySettings::ALL_ALLOWED
            })
            .unwrap();

        assert_eq!(device.privacy_mode(), Some(true));
        assert_eq!(device.indicator(PolicyField::Recording), None);
        assert_eq!(device.indicator(PolicyField::Streaming), Some(true));
    }

    #[test]
    fn indicator_strategy_sets_recording_indicator() {
        let device = Arc::new(MockDevice::new(DeviceCapabilities::camera()));
        let gated = GatedDevice::new(device.clone(), RecordingBlockStrategy::PrivacyMode);

        assert_eq!(gated.recording_strategy(), RecordingBlockStrategy::IndicatorFlag);
        gated.apply(&PolicySettings::ALL_BLOCKED).unwrap();

        assert_eq!(device.indicator(PolicyField::Recording), Some(false));
        assert_eq!(device.privacy_mode(), None);
    }

    #[test]
    fn failures_are_collected() {
        let device = Arc::new(MockDevice::new(DeviceCapabilities::camera()));
        device.set_fail(true);
        let gated = GatedDevice::new(device.clone(), RecordingBlockStrategy::IndicatorFlag);

        let err = gated.apply(&PolicySettings::ALL_BLOCKED).unwrap_err();
        assert!(matches!(err, DeviceError::ApplyFailed(msg) if msg.contains("recording")));
    }
}
