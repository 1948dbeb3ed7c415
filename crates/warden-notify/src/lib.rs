//! Webhook notifications for wardend
//!
//! Provides:
//! - Per-event subscription filtering
//! - JSON POST delivery with operator-configured headers
//! - Linear-backoff retries that never surface to the caller
//! - `flush()` to await everything still in flight at shutdown

mod dispatcher;
mod mock;
mod retry;
mod transport;

pub use dispatcher::*;
pub use mock::*;
pub use retry::*;
pub use transport::*;
