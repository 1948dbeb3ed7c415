//! Shared policy model for wardend
//!
//! This crate defines the types every other crate agrees on:
//! - Policy settings and the capabilities they gate
//! - Triggers, schedule edges, and policy sources
//! - Schedules, profiles, and webhook delivery configuration
//! - The webhook notification payload (wire format)

mod events;
mod model;
mod types;

pub use events::*;
pub use model::*;
pub use types::*;

/// Value of the `User-Agent` header on webhook deliveries
pub const USER_AGENT: &str = concat!("wardend/", env!("CARGO_PKG_VERSION"));
