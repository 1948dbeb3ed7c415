//! Mock webhook transport for testing

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::{TransportError, TransportResult, WebhookRequest, WebhookTransport};

/// One POST the mock received
#[derive(Debug, Clone)]
pub struct RecordedAttempt {
    pub at: Instant,
    pub request: WebhookRequest,
}

/// Records every request and answers with a configurable status
#[derive(Debug)]
pub struct MockTransport {
    status: Mutex<u16>,
    attempts: Mutex<Vec<RecordedAttempt>>,
}

impl MockTransport {
    /// Answers every request with `status`
    pub fn new(status: u16) -> Self {
        Self {
            status: Mutex::new(status),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn set_status(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    pub fn attempts(&self) -> Vec<RecordedAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Bodies received, parsed as JSON
    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| serde_json::from_str(&a.request.body).ok())
            .collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::ok()
    }
}

#[async_trait]
impl WebhookTransport for MockTransport {
    async fn post(&self, request: &WebhookRequest) -> TransportResult<u16> {
        self.attempts.lock().unwrap().push(RecordedAttempt {
            at: Instant::now(),
            request: request.clone(),
        });

        let status = *self.status.lock().unwrap();
        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(TransportError::Status(status))
        }
    }
}
