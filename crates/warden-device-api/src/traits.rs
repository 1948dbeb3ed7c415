//! Device adapter traits

use thiserror::Error;
use warden_api::PolicyField;

use crate::DeviceCapabilities;

/// Errors from device adapter operations
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to apply policy: {0}")]
    ApplyFailed(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Device adapter trait - implemented by the device-management layer
pub trait DeviceAdapter: Send + Sync {
    /// Capabilities of the wrapped device. Read once, at registration.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Set the local gate consulted before a capability is used
    fn set_indicator(&self, field: PolicyField, allowed: bool) -> DeviceResult<()>;

    /// Optional: toggle the device's own recording privacy mode
    fn set_privacy_mode(&self, _enabled: bool) -> DeviceResult<()> {
        Err(DeviceError::Unsupported("privacy mode".into()))
    }

    /// Optional: check if the device is reachable
    fn is_healthy(&self) -> bool {
        true
    }
}
