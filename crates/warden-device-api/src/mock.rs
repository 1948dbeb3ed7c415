//! Mock device adapter for testing

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use warden_api::PolicyField;

use crate::{DeviceAdapter, DeviceCapabilities, DeviceError, DeviceResult};

/// Mock device for unit/integration testing
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    indicators: Mutex<HashMap<PolicyField, bool>>,
    privacy_mode: Mutex<Option<bool>>,
    calls: AtomicUsize,

    /// Configure every write to fail
    fail: AtomicBool,
}

impl MockDevice {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            indicators: Mutex::new(HashMap::new()),
            privacy_mode: Mutex::new(None),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Last "allowed" value written for a field, if any
    pub fn indicator(&self, field: PolicyField) -> Option<bool> {
        self.indicators.lock().unwrap().get(&field).copied()
    }

    pub fn privacy_mode(&self) -> Option<bool> {
        *self.privacy_mode.lock().unwrap()
    }

    /// Number of write calls received, failed ones included
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record_call(&self) -> DeviceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("mock device offline".into()));
        }
        Ok(())
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(DeviceCapabilities::default())
    }
}

impl DeviceAdapter for MockDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn set_indicator(&self, field: PolicyField, allowed: bool) -> DeviceResult<()> {
        self.record_call()?;
        self.indicators.lock().unwrap().insert(field, allowed);
        Ok(())
    }

    fn set_privacy_mode(&self, enabled: bool) -> DeviceResult<()> {
        if !self.capabilities.has_privacy_mode {
            return Err(DeviceError::Unsupported("privacy mode".into()));
        }
        self.record_call()?;
        *self.privacy_mode.lock().unwrap() = Some(enabled);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}
