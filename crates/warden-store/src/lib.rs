//! Persistence layer for wardend
//!
//! Provides:
//! - A string key-value store (SQLite-backed, or in memory for tests)
//! - The policy audit log (size- and age-bounded, newest first)

mod audit;
mod memory;
mod sqlite;
mod traits;

pub use audit::*;
pub use memory::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Well-known keys
pub mod keys {
    pub const AUDIT_LOG: &str = "audit_log";
    pub const AUDIT_RETENTION_DAYS: &str = "audit_retention_days";
    pub const GLOBAL_OVERRIDE: &str = "global_override";
    pub const ACTIVE_PROFILE: &str = "active_profile";
}
