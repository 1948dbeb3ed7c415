//! Error types for wardend

use thiserror::Error;

use crate::{ProfileId, SubjectId};

/// Core error type for wardend operations
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Subject not registered: {0}")]
    SubjectNotFound(SubjectId),

    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Listener failed: {0}")]
    ListenerFailed(String),
}

impl WardenError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn listener(msg: impl Into<String>) -> Self {
        Self::ListenerFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
