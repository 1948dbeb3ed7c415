//! Shared utilities for wardend
//!
//! This crate provides:
//! - ID types (SubjectId, ProfileId, DeliveryId)
//! - Wall-clock types and an injectable clock
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
