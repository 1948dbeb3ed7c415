//! Store trait definitions

use crate::StoreResult;

/// String key-value persistence.
///
/// Callers own the encoding of values. A missing key is `Ok(None)`, not an
/// error; callers that read structured values must fall back to a default
/// when the stored text does not parse.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Read a boolean flag, treating missing or malformed values as `default`
pub fn get_flag(store: &dyn KeyValueStore, key: &str, default: bool) -> bool {
    match store.get(key) {
        Ok(Some(value)) => match value.trim() {
            "true" => true,
            "false" => false,
            other => {
                tracing::warn!(key, value = other, "Ignoring malformed stored flag");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read stored flag");
            default
        }
    }
}
