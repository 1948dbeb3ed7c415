//! Core policy engine for wardend
//!
//! This crate holds the decision-making half of the daemon:
//! - Schedule windows and edge detection on a fixed interval
//! - Effective policy resolution (override, disabled, profile, schedule, manual)
//! - Profile activation with at most one active profile
//! - The coordinator that applies, audits and reports every transition

mod coordinator;
mod observer;
mod profiles;
mod resolver;
mod scheduler;
pub mod window;

pub use coordinator::*;
pub use observer::*;
pub use profiles::*;
pub use resolver::*;
pub use scheduler::*;
