//! Notification dispatcher
//!
//! Every `notify_*` helper checks the subscription filter, builds a
//! [`NotificationPayload`] and hands it to a spawned delivery task. Delivery
//! retries on a fixed policy and never reports back to the caller; failures
//! end up in the log. Spawned tasks are tracked so `flush()` can wait for them.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_api::{
    EventKind, NotificationPayload, PolicySettings, Profile, Trigger, USER_AGENT, WebhookConfig,
};
use warden_core::{PolicyChange, PolicyObserver, ScheduleChange};
use warden_util::{Clock, DeliveryId, SubjectId};

use crate::{HttpTransport, RetryPolicy, TransportError, WebhookRequest, WebhookTransport};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Webhook is not configured")]
    NotConfigured,

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Outcome of an operator-initiated test delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub success: bool,
    pub message: String,
}

enum TransportSource {
    /// Build an [`HttpTransport`] from each config's timeout
    Http,
    Fixed(Arc<dyn WebhookTransport>),
}

struct ActiveWebhook {
    config: WebhookConfig,
    transport: Arc<dyn WebhookTransport>,
}

pub struct NotificationDispatcher {
    source: TransportSource,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<ActiveWebhook>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Dispatcher that delivers over HTTP. Disabled until configured.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_source(TransportSource::Http, clock)
    }

    /// Dispatcher that always delivers through `transport`
    pub fn with_transport(transport: Arc<dyn WebhookTransport>, clock: Arc<dyn Clock>) -> Self {
        Self::with_source(TransportSource::Fixed(transport), clock)
    }

    fn with_source(source: TransportSource, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            clock,
            active: Mutex::new(None),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the webhook configuration. `None` disables delivery.
    pub fn set_config(&self, config: Option<WebhookConfig>) -> DeliveryResult<()> {
        let active = match config {
            Some(config) => {
                let transport: Arc<dyn WebhookTransport> = match &self.source {
                    TransportSource::Http => Arc::new(HttpTransport::new(config.timeout)?),
                    TransportSource::Fixed(transport) => transport.clone(),
                };
                info!(
                    url = %config.url,
                    events = config.events.len(),
                    "Webhook delivery enabled"
                );
                Some(ActiveWebhook { config, transport })
            }
            None => {
                info!("Webhook delivery disabled");
                None
            }
        };

        *self.active.lock().unwrap() = active;
        Ok(())
    }

    pub fn get_config(&self) -> Option<WebhookConfig> {
        self.active.lock().unwrap().as_ref().map(|a| a.config.clone())
    }

    pub fn is_enabled_for(&self, event: EventKind) -> bool {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|a| a.config.events.contains(&event))
    }

    // Event helpers. Each returns the delivery id when something was queued.

    pub fn notify_policy_change(&self, change: &PolicyChange) -> Option<DeliveryId> {
        if !self.is_enabled_for(EventKind::PolicyChanged) {
            return None;
        }

        let mut payload =
            NotificationPayload::new(EventKind::PolicyChanged, change.trigger, &self.clock.now())
                .with_subject(change.subject_id.clone(), change.subject_name.clone())
                .with_settings(change.settings);
        if let Some(profile) = &change.profile_name {
            payload = payload.with_profile(profile.clone());
        }
        if let Some(previous) = &change.previous {
            let changed: Vec<&str> = previous
                .changed_fields(&change.settings)
                .iter()
                .map(|f| f.label())
                .collect();
            payload = payload.with_detail("changed", changed);
        }

        self.submit(payload)
    }

    pub fn notify_profile_activated(&self, profile: &Profile, active: bool) -> Option<DeliveryId> {
        if !self.is_enabled_for(EventKind::ProfileActivated) {
            return None;
        }

        let payload =
            NotificationPayload::new(EventKind::ProfileActivated, Trigger::Profile, &self.clock.now())
                .with_profile(profile.name.clone())
                .with_settings(profile.settings)
                .with_detail("active", active)
                .with_detail("members", profile.member_ids.len());

        self.submit(payload)
    }

    pub fn notify_panic_mode(&self, active: bool) -> Option<DeliveryId> {
        if !self.is_enabled_for(EventKind::PanicMode) {
            return None;
        }

        let settings = if active {
            PolicySettings::ALL_BLOCKED
        } else {
            PolicySettings::ALL_ALLOWED
        };
        let payload = NotificationPayload::new(EventKind::PanicMode, Trigger::Panic, &self.clock.now())
            .with_settings(settings)
            .with_detail("active", active);

        self.submit(payload)
    }

    pub fn notify_schedule_triggered(
        &self,
        subject_id: &SubjectId,
        subject_name: &str,
        change: &ScheduleChange,
    ) -> Option<DeliveryId> {
        if !self.is_enabled_for(EventKind::ScheduleTriggered) {
            return None;
        }

        let payload =
            NotificationPayload::new(EventKind::ScheduleTriggered, Trigger::Schedule, &self.clock.now())
                .with_subject(subject_id.clone(), subject_name)
                .with_settings(change.settings)
                .with_detail("reason", change.reason.as_str());

        self.submit(payload)
    }

    /// Wait for every delivery in flight, including ones queued while waiting
    pub async fn flush(&self) {
        loop {
            let handles = std::mem::take(&mut *self.in_flight.lock().unwrap());
            if handles.is_empty() {
                return;
            }

            debug!(pending = handles.len(), "Flushing webhook deliveries");
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Webhook delivery task failed");
                }
            }
        }
    }

    /// Send one test payload, ignoring the event filter and without retries
    pub async fn test(&self) -> TestResult {
        match self.send_test().await {
            Ok(status) => TestResult {
                success: true,
                message: format!("Webhook responded with status {}", status),
            },
            Err(e) => TestResult {
                success: false,
                message: e.to_string(),
            },
        }
    }

    async fn send_test(&self) -> DeliveryResult<u16> {
        let (request, transport) = {
            let active = self.active.lock().unwrap();
            let active = active.as_ref().ok_or(DeliveryError::NotConfigured)?;

            let payload =
                NotificationPayload::new(EventKind::PolicyChanged, Trigger::Manual, &self.clock.now())
                    .with_detail("test", true);
            (build_request(&active.config, &payload)?, active.transport.clone())
        };

        info!(url = %request.url, "Sending test webhook");
        Ok(transport.post(&request).await?)
    }

    fn submit(&self, payload: NotificationPayload) -> Option<DeliveryId> {
        let event = payload.event;
        let (request, transport) = {
            let active = self.active.lock().unwrap();
            let active = active.as_ref()?;

            let payload = if active.config.include_camera_details {
                payload
            } else {
                payload.without_subject()
            };
            match build_request(&active.config, &payload) {
                Ok(request) => (request, active.transport.clone()),
                Err(e) => {
                    error!(event = %event, error = %e, "Dropping webhook notification");
                    return None;
                }
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(event = %event, "No async runtime; dropping webhook notification");
            return None;
        };

        let id = DeliveryId::new();
        let handle = runtime.spawn(deliver(transport, request, self.retry, id, event));

        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);

        debug!(delivery_id = %id, event = %event, "Webhook queued");
        Some(id)
    }
}

impl PolicyObserver for NotificationDispatcher {
    fn policy_changed(&self, change: &PolicyChange) {
        self.notify_policy_change(change);
    }

    fn profile_changed(&self, profile: &Profile, active: bool) {
        self.notify_profile_activated(profile, active);
    }

    fn override_changed(&self, active: bool) {
        self.notify_panic_mode(active);
    }

    fn schedule_triggered(&self, subject_name: &str, change: &ScheduleChange) {
        self.notify_schedule_triggered(&change.subject_id, subject_name, change);
    }
}

/// JSON body plus default headers, with operator headers taking precedence
fn build_request(
    config: &WebhookConfig,
    payload: &NotificationPayload,
) -> DeliveryResult<WebhookRequest> {
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
    ];
    for (name, value) in &config.headers {
        match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(existing) => existing.1 = value.clone(),
            None => headers.push((name.clone(), value.clone())),
        }
    }

    Ok(WebhookRequest {
        url: config.url.clone(),
        headers,
        body: serde_json::to_string(payload)?,
    })
}

async fn deliver(
    transport: Arc<dyn WebhookTransport>,
    request: WebhookRequest,
    retry: RetryPolicy,
    id: DeliveryId,
    event: EventKind,
) {
    for attempt in 0..retry.max_attempts {
        let delay = retry.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match transport.post(&request).await {
            Ok(status) => {
                debug!(
                    delivery_id = %id,
                    event = %event,
                    attempt = attempt + 1,
                    status,
                    "Webhook delivered"
                );
                return;
            }
            Err(e) => {
                warn!(
                    delivery_id = %id,
                    event = %event,
                    attempt = attempt + 1,
                    max_attempts = retry.max_attempts,
                    error = %e,
                    "Webhook delivery attempt failed"
                );
            }
        }
    }

    error!(
        delivery_id = %id,
        event = %event,
        url = %request.url,
        attempts = retry.max_attempts,
        "Webhook delivery failed permanently"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockTransport;
    use chrono::{Local, TimeZone};
    use std::collections::BTreeSet;
    use std::time::Duration;
    use warden_api::{PolicySource, ScheduleEdge};
    use warden_util::{ManualClock, ProfileId};

    fn dispatcher(status: u16) -> (Arc<MockTransport>, NotificationDispatcher) {
        let transport = Arc::new(MockTransport::new(status));
        let clock = Arc::new(ManualClock::new(
            Local.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(),
        ));
        let dispatcher = NotificationDispatcher::with_transport(transport.clone(), clock);
        (transport, dispatcher)
    }

    fn hook() -> WebhookConfig {
        WebhookConfig::new("https://example.test/hook")
    }

    fn change() -> PolicyChange {
        PolicyChange {
            subject_id: SubjectId::new("cam-1"),
            subject_name: "Front Door".into(),
            previous: Some(PolicySettings::ALL_ALLOWED),
            settings: PolicySettings {
                block_recording: true,
                ..PolicySettings::ALL_ALLOWED
            },
            source: PolicySource::Profile,
            trigger: Trigger::Profile,
            profile_name: Some("Away Mode".into()),
        }
    }

    #[tokio::test]
    async fn disabled_without_config() {
        let (transport, dispatcher) = dispatcher(200);

        assert!(dispatcher.notify_panic_mode(true).is_none());
        assert!(!dispatcher.is_enabled_for(EventKind::PanicMode));
        dispatcher.flush().await;
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribed_events_are_skipped() {
        let (transport, dispatcher) = dispatcher(200);
        dispatcher
            .set_config(Some(hook().with_events([EventKind::PanicMode])))
            .unwrap();

        assert!(dispatcher.notify_policy_change(&change()).is_none());
        assert!(dispatcher.notify_panic_mode(true).is_some());
        dispatcher.flush().await;

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["event"], "panic_mode");
        assert_eq!(bodies[0]["trigger"], "panic");
        assert_eq!(bodies[0]["details"]["active"], true);
        assert_eq!(bodies[0]["settings"]["blockStreaming"], true);
    }

    #[tokio::test]
    async fn policy_change_payload() {
        let (transport, dispatcher) = dispatcher(200);
        dispatcher
            .set_config(Some(hook().with_header("Authorization", "Bearer secret")))
            .unwrap();

        dispatcher.notify_policy_change(&change());
        dispatcher.flush().await;

        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 1);
        let request = &attempts[0].request;
        assert_eq!(request.url, "https://example.test/hook");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("user-agent"), Some(USER_AGENT));
        assert_eq!(request.header("authorization"), Some("Bearer secret"));

        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["event"], "policy_changed");
        assert_eq!(body["camera"], "Front Door");
        assert_eq!(body["cameraId"], "cam-1");
        assert_eq!(body["profile"], "Away Mode");
        assert_eq!(body["trigger"], "profile");
        assert_eq!(body["details"]["changed"], serde_json::json!(["recording"]));
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn camera_details_can_be_withheld() {
        let (transport, dispatcher) = dispatcher(200);
        let mut config = hook();
        config.include_camera_details = false;
        dispatcher.set_config(Some(config)).unwrap();

        dispatcher.notify_policy_change(&change());
        dispatcher.flush().await;

        let body = &transport.bodies()[0];
        assert!(body.get("camera").is_none());
        assert!(body.get("cameraId").is_none());
        assert_eq!(body["settings"]["blockRecording"], true);
    }

    #[tokio::test]
    async fn operator_headers_override_defaults() {
        let (transport, dispatcher) = dispatcher(200);
        dispatcher
            .set_config(Some(hook().with_header("content-type", "application/cloudevents+json")))
            .unwrap();

        dispatcher.notify_panic_mode(false);
        dispatcher.flush().await;

        let request = &transport.attempts()[0].request;
        assert_eq!(request.header("Content-Type"), Some("application/cloudevents+json"));
        assert_eq!(
            request.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("content-type")).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_endpoint_gets_three_spaced_attempts() {
        let (transport, dispatcher) = dispatcher(500);
        dispatcher.set_config(Some(hook())).unwrap();

        assert!(dispatcher.notify_panic_mode(true).is_some());
        dispatcher.flush().await;

        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 3);

        let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert_eq!(gaps, vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
        assert!(gaps[1] > gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_retry() {
        let (transport, dispatcher) = dispatcher(503);
        dispatcher.set_config(Some(hook())).unwrap();

        dispatcher.notify_panic_mode(true);
        // First attempt fails immediately; recover before the first retry
        tokio::task::yield_now().await;
        transport.set_status(200);
        dispatcher.flush().await;

        assert_eq!(transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn test_delivery_bypasses_filter() {
        let (transport, dispatcher) = dispatcher(200);

        let result = dispatcher.test().await;
        assert!(!result.success);
        assert_eq!(result.message, "Webhook is not configured");

        dispatcher
            .set_config(Some(hook().with_events(std::iter::empty())))
            .unwrap();
        let result = dispatcher.test().await;
        assert!(result.success, "{}", result.message);
        assert_eq!(transport.bodies()[0]["details"]["test"], true);

        transport.set_status(503);
        let result = dispatcher.test().await;
        assert!(!result.success);
        assert!(result.message.contains("503"));
        assert_eq!(transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn observer_routes_events() {
        let (transport, dispatcher) = dispatcher(200);
        dispatcher.set_config(Some(hook())).unwrap();
        let observer: &dyn PolicyObserver = &dispatcher;

        let profile = Profile {
            id: ProfileId::new("away"),
            name: "Away Mode".into(),
            member_ids: BTreeSet::from([SubjectId::new("cam-1")]),
            settings: PolicySettings::ALL_BLOCKED,
            active: true,
        };
        observer.profile_changed(&profile, true);
        observer.schedule_triggered(
            "Front Door",
            &ScheduleChange {
                subject_id: SubjectId::new("cam-1"),
                settings: PolicySettings::ALL_BLOCKED,
                reason: ScheduleEdge::ScheduleStart,
            },
        );
        dispatcher.flush().await;

        let mut events: Vec<String> = transport
            .bodies()
            .iter()
            .map(|b| b["event"].as_str().unwrap().to_string())
            .collect();
        events.sort();
        assert_eq!(events, vec!["profile_activated", "schedule_triggered"]);

        let schedule = transport
            .bodies()
            .into_iter()
            .find(|b| b["event"] == "schedule_triggered")
            .unwrap();
        assert_eq!(schedule["details"]["reason"], "schedule_start");
        assert_eq!(schedule["camera"], "Front Door");
    }

    #[tokio::test]
    async fn clearing_config_stops_delivery() {
        let (transport, dispatcher) = dispatcher(200);
        dispatcher.set_config(Some(hook())).unwrap();
        dispatcher.set_config(None).unwrap();

        assert!(dispatcher.get_config().is_none());
        assert!(dispatcher.notify_panic_mode(true).is_none());
        dispatcher.flush().await;
        assert_eq!(transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn http_dispatcher_accepts_config() {
        let clock = Arc::new(ManualClock::new(Local::now()));
        let dispatcher = NotificationDispatcher::new(clock);
        dispatcher.set_config(Some(hook())).unwrap();
        assert_eq!(dispatcher.get_config().unwrap().url, "https://example.test/hook");
    }
}
