//! Pluggable recording suppression

use tracing::warn;
use warden_api::{PolicyField, RecordingBlockStrategy};

use crate::{DeviceAdapter, DeviceCapabilities, DeviceResult};

/// One way of stopping a device from recording
pub trait RecordingBlock: Send + Sync {
    fn strategy(&self) -> RecordingBlockStrategy;

    fn apply(&self, device: &dyn DeviceAdapter, blocked: bool) -> DeviceResult<()>;
}

/// Flip the local "recording allowed" indicator the recorder checks
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorFlagBlock;

impl RecordingBlock for IndicatorFlagBlock {
    fn strategy(&self) -> RecordingBlockStrategy {
        RecordingBlockStrategy::IndicatorFlag
    }

    fn apply(&self, device: &dyn DeviceAdapter, blocked: bool) -> DeviceResult<()> {
        device.set_indicator(PolicyField::Recording, !blocked)
    }
}

/// Put the device itself into recording privacy mode
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivacyModeBlock;

impl RecordingBlock for PrivacyModeBlock {
    fn strategy(&self) -> RecordingBlockStrategy {
        RecordingBlockStrategy::PrivacyMode
    }

    fn apply(&self, device: &dyn DeviceAdapter, blocked: bool) -> DeviceResult<()> {
        device.set_privacy_mode(blocked)
    }
}

/// Pick the blocker for a configured strategy.
///
/// A device without a native privacy mode always gets the indicator flag.
pub fn recording_block_for(
    strategy: RecordingBlockStrategy,
    capabilities: &DeviceCapabilities,
) -> Box<dyn RecordingBlock> {
    match strategy {
        RecordingBlockStrategy::IndicatorFlag => Box::new(IndicatorFlagBlock),
        RecordingBlockStrategy::PrivacyMode if capabilities.has_privacy_mode => {
            Box::new(PrivacyModeBlock)
        }
        RecordingBlockStrategy::PrivacyMode => {
            warn!("Device has no privacy mode; falling back to indicator flag");
            Box::new(IndicatorFlagBlock)
        }
    }
}
