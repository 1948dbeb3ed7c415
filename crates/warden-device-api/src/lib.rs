//! Device adapter interfaces for wardend
//!
//! This crate defines the capability-based interface between the policy
//! core and the devices it gates. It contains no device integration itself:
//! the device-management layer implements [`DeviceAdapter`], and
//! [`GatedDevice`] applies resolved policies through it, touching only the
//! capabilities the device reported at registration.

mod capabilities;
mod gate;
mod mock;
mod recording;
mod traits;

pub use capabilities::*;
pub use gate::*;
pub use mock::*;
pub use recording::*;
pub use traits::*;
