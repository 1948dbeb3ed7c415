//! Periodic schedule evaluation with edge detection
//!
//! The engine owns one registration per subject and re-evaluates all of them
//! on every tick. A subject whose active flag flipped produces one
//! [`ScheduleChange`], delivered to every listener after the registry lock
//! has been released. Ticks never overlap: a tick that outlasts the interval
//! delays the next one.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use warden_api::{PolicySettings, Schedule, ScheduleEdge};
use warden_util::{Clock, SubjectId, WardenError};

use crate::window;

pub use warden_api::DEFAULT_CHECK_INTERVAL;

/// One schedule edge for one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleChange {
    pub subject_id: SubjectId,
    /// The schedule's settings on start, the all-allowed baseline on end
    pub settings: PolicySettings,
    pub reason: ScheduleEdge,
}

impl ScheduleChange {
    fn new(subject_id: SubjectId, schedule: &Schedule, active: bool) -> Self {
        if active {
            Self {
                subject_id,
                settings: schedule.settings,
                reason: ScheduleEdge::ScheduleStart,
            }
        } else {
            Self {
                subject_id,
                settings: PolicySettings::ALL_ALLOWED,
                reason: ScheduleEdge::ScheduleEnd,
            }
        }
    }
}

/// Callback invoked for every schedule edge
pub type ScheduleListener = dyn Fn(&ScheduleChange) -> Result<(), WardenError> + Send + Sync;

/// Per-subject registration
#[derive(Debug, Clone)]
pub struct ScheduleRegistration {
    pub subject_id: SubjectId,
    pub schedule: Schedule,
    pub currently_active: bool,
    pub last_check: DateTime<Local>,
}

/// Snapshot of one subject's schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    pub schedule: Schedule,
    pub is_active: bool,
    pub next_change: Option<DateTime<Local>>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatusEntry {
    pub subject_id: SubjectId,
    pub is_active: bool,
    pub next_change: Option<DateTime<Local>>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    pub total_schedules: usize,
    pub active_schedules: usize,
    pub entries: Vec<ScheduleStatusEntry>,
}

struct EngineInner {
    clock: Arc<dyn Clock>,
    interval: Duration,
    registrations: Mutex<BTreeMap<SubjectId, ScheduleRegistration>>,
    listeners: Mutex<Vec<(u64, Arc<ScheduleListener>)>>,
    next_listener_id: AtomicU64,
    /// Held for the whole of a tick so ticks never interleave
    tick_lock: Mutex<()>,
}

impl EngineInner {
    fn tick(&self) -> usize {
        let _tick = self.tick_lock.lock().unwrap();
        let now = self.clock.now();

        let changes: Vec<ScheduleChange> = {
            let mut registrations = self.registrations.lock().unwrap();
            registrations
                .values_mut()
                .filter_map(|reg| {
                    let active = window::is_active(&reg.schedule, &now);
                    reg.last_check = now;
                    if active == reg.currently_active {
                        return None;
                    }
                    reg.currently_active = active;
                    Some(ScheduleChange::new(reg.subject_id.clone(), &reg.schedule, active))
                })
                .collect()
        };

        for change in &changes {
            info!(
                subject_id = %change.subject_id,
                reason = %change.reason,
                "Schedule edge"
            );
            self.dispatch(change);
        }

        changes.len()
    }

    fn dispatch(&self, change: &ScheduleChange) {
        let listeners: Vec<(u64, Arc<ScheduleListener>)> =
            self.listeners.lock().unwrap().iter().cloned().collect();

        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(change))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        listener = id,
                        subject_id = %change.subject_id,
                        error = %e,
                        "Schedule listener failed"
                    );
                }
                Err(_) => {
                    error!(
                        listener = id,
                        subject_id = %change.subject_id,
                        "Schedule listener panicked"
                    );
                }
            }
        }
    }

    fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns per-subject schedules and raises edges on a fixed interval
pub struct ScheduleEngine {
    inner: Arc<EngineInner>,
    ticker: Mutex<Option<Ticker>>,
}

impl ScheduleEngine {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                clock,
                interval,
                registrations: Mutex::new(BTreeMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                tick_lock: Mutex::new(()),
            }),
            ticker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the periodic tick. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap();
        if ticker.is_some() {
            debug!("Schedule engine already running");
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let period = inner.interval;

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        inner.tick();
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Schedule ticker stopping");
                        break;
                    }
                }
            }
        });

        info!(interval_secs = period.as_secs(), "Schedule engine started");
        *ticker = Some(Ticker { shutdown, handle });
    }

    /// Stop future ticks. Does not wait for, or interrupt, a tick in flight.
    pub fn stop(&self) {
        if let Some(ticker) = self.ticker.lock().unwrap().take() {
            let _ = ticker.shutdown.send(true);
            drop(ticker.handle);
            info!("Schedule engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().unwrap().is_some()
    }

    /// Register or replace a subject's schedule.
    ///
    /// A first registration only seeds the active flag. Replacing the
    /// schedule of an inactive subject with one that is already inside its
    /// window fires `schedule_start` before returning.
    pub fn set_schedule(&self, subject_id: SubjectId, schedule: Schedule) {
        let now = self.inner.clock.now();
        let active = window::is_active(&schedule, &now);

        let edge = {
            let mut registrations = self.inner.registrations.lock().unwrap();
            let was_active = registrations
                .get(&subject_id)
                .map(|reg| reg.currently_active);

            let edge = match was_active {
                Some(false) if active => {
                    Some(ScheduleChange::new(subject_id.clone(), &schedule, true))
                }
                _ => None,
            };

            debug!(
                subject_id = %subject_id,
                schedule = %schedule.describe(),
                active,
                "Schedule set"
            );
            registrations.insert(
                subject_id.clone(),
                ScheduleRegistration {
                    subject_id,
                    schedule,
                    currently_active: active,
                    last_check: now,
                },
            );
            edge
        };

        if let Some(change) = edge {
            info!(subject_id = %change.subject_id, "Schedule enabled inside its window");
            self.inner.dispatch(&change);
        }
    }

    /// Unregister a subject. Never fires an edge.
    pub fn remove_schedule(&self, subject_id: &SubjectId) -> bool {
        let removed = self
            .inner
            .registrations
            .lock()
            .unwrap()
            .remove(subject_id)
            .is_some();
        if removed {
            debug!(subject_id = %subject_id, "Schedule removed");
        }
        removed
    }

    pub fn get_schedule(&self, subject_id: &SubjectId) -> Option<Schedule> {
        self.inner
            .registrations
            .lock()
            .unwrap()
            .get(subject_id)
            .map(|reg| reg.schedule.clone())
    }

    /// Active flag as of the last evaluation
    pub fn is_active(&self, subject_id: &SubjectId) -> bool {
        self.inner
            .registrations
            .lock()
            .unwrap()
            .get(subject_id)
            .is_some_and(|reg| reg.currently_active)
    }

    /// The schedule's settings if it applies right now, evaluated live
    pub fn active_settings(&self, subject_id: &SubjectId) -> Option<PolicySettings> {
        let now = self.inner.clock.now();
        let registrations = self.inner.registrations.lock().unwrap();
        let reg = registrations.get(subject_id)?;
        window::is_active(&reg.schedule, &now).then_some(reg.schedule.settings)
    }

    /// Schedule settings if active now, else `baseline`. Never trusts the cached flag.
    pub fn get_effective_settings(
        &self,
        subject_id: &SubjectId,
        baseline: PolicySettings,
    ) -> PolicySettings {
        self.active_settings(subject_id).unwrap_or(baseline)
    }

    pub fn get_info(&self, subject_id: &SubjectId) -> Option<ScheduleInfo> {
        let now = self.inner.clock.now();
        let registrations = self.inner.registrations.lock().unwrap();
        let reg = registrations.get(subject_id)?;

        Some(ScheduleInfo {
            schedule: reg.schedule.clone(),
            is_active: reg.currently_active,
            next_change: window::next_change(&reg.schedule, &now),
            description: reg.schedule.describe(),
        })
    }

    pub fn get_active_list(&self) -> Vec<SubjectId> {
        self.inner
            .registrations
            .lock()
            .unwrap()
            .values()
            .filter(|reg| reg.currently_active)
            .map(|reg| reg.subject_id.clone())
            .collect()
    }

    pub fn get_status(&self) -> ScheduleStatus {
        let now = self.inner.clock.now();
        let registrations = self.inner.registrations.lock().unwrap();

        let entries: Vec<ScheduleStatusEntry> = registrations
            .values()
            .map(|reg| ScheduleStatusEntry {
                subject_id: reg.subject_id.clone(),
                is_active: reg.currently_active,
                next_change: window::next_change(&reg.schedule, &now),
                description: reg.schedule.describe(),
            })
            .collect();

        ScheduleStatus {
            total_schedules: entries.len(),
            active_schedules: entries.iter().filter(|e| e.is_active).count(),
            entries,
        }
    }

    /// Subscribe to schedule edges
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ScheduleChange) -> Result<(), WardenError> + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let listener: Arc<ScheduleListener> = Arc::new(listener);
        self.inner.listeners.lock().unwrap().push((id, listener));

        Subscription {
            id,
            engine: Arc::downgrade(&self.inner),
        }
    }

    /// Run one evaluation now, e.g. after the system clock changed.
    /// Returns the number of edges fired.
    pub fn force_check(&self) -> usize {
        debug!("Forced schedule check");
        self.inner.tick()
    }
}

impl Drop for ScheduleEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle returned by [`ScheduleEngine::on_change`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    engine: Weak<EngineInner>,
}

impl Subscription {
    /// Stop receiving edges. Returns false if already gone.
    pub fn unsubscribe(self) -> bool {
        self.engine
            .upgrade()
            .is_some_and(|inner| inner.remove_listener(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_api::ScheduleKind;
    use warden_util::{ManualClock, WallClock};

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 6, h, m, 0).unwrap()
    }

    fn daytime() -> Schedule {
        Schedule::new(
            ScheduleKind::Daily,
            WallClock::new(8, 0).unwrap(),
            WallClock::new(22, 0).unwrap(),
            PolicySettings::ALL_BLOCKED,
        )
    }

    fn engine_at(h: u32, m: u32) -> (Arc<ManualClock>, ScheduleEngine) {
        let clock = Arc::new(ManualClock::new(at(h, m)));
        let engine = ScheduleEngine::new(clock.clone(), DEFAULT_CHECK_INTERVAL);
        (clock, engine)
    }

    fn collect(engine: &ScheduleEngine) -> (Arc<Mutex<Vec<ScheduleChange>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = engine.on_change(move |change| {
            sink.lock().unwrap().push(change.clone());
            Ok(())
        });
        (seen, sub)
    }

    fn cam() -> SubjectId {
        SubjectId::new("cam-1")
    }

    #[test]
    fn tick_fires_start_then_end() {
        let (clock, engine) = engine_at(7, 59);
        let (seen, _sub) = collect(&engine);

        engine.set_schedule(cam(), daytime());
        assert!(!engine.is_active(&cam()));
        assert_eq!(engine.force_check(), 0);

        clock.set(at(8, 0));
        assert_eq!(engine.force_check(), 1);
        assert!(engine.is_active(&cam()));
        assert_eq!(engine.force_check(), 0);

        clock.set(at(22, 0));
        assert_eq!(engine.force_check(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ScheduleChange {
                    subject_id: cam(),
                    settings: PolicySettings::ALL_BLOCKED,
                    reason: ScheduleEdge::ScheduleStart,
                },
                ScheduleChange {
                    subject_id: cam(),
                    settings: PolicySettings::ALL_ALLOWED,
                    reason: ScheduleEdge::ScheduleEnd,
                },
            ]
        );
    }

    #[test]
    fn first_registration_seeds_without_edge() {
        let (_, engine) = engine_at(12, 0);
        let (seen, _sub) = collect(&engine);

        engine.set_schedule(cam(), daytime());
        assert!(engine.is_active(&cam()));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(engine.force_check(), 0);
    }

    #[test]
    fn enabling_inside_window_fires_start() {
        let (_, engine) = engine_at(12, 0);
        let (seen, _sub) = collect(&engine);

        let mut disabled = daytime();
        disabled.enabled = false;
        engine.set_schedule(cam(), disabled);
        assert!(!engine.is_active(&cam()));

        engine.set_schedule(cam(), daytime());
        assert!(engine.is_active(&cam()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].reason, ScheduleEdge::ScheduleStart);
    }

    #[test]
    fn remove_fires_nothing() {
        let (clock, engine) = engine_at(12, 0);
        let (seen, _sub) = collect(&engine);

        engine.set_schedule(cam(), daytime());
        assert!(engine.remove_schedule(&cam()));
        assert!(!engine.remove_schedule(&cam()));

        clock.set(at(23, 0));
        engine.force_check();
        assert!(seen.lock().unwrap().is_empty());
        assert!(engine.get_info(&cam()).is_none());
    }

    #[test]
    fn failing_listeners_do_not_stop_others() {
        let (clock, engine) = engine_at(7, 0);
        let _err = engine.on_change(|_| Err(WardenError::listener("boom")));
        let _panic = engine.on_change(|_| panic!("listener bug"));
        let (seen, _sub) = collect(&engine);

        engine.set_schedule(cam(), daytime());
        engine.set_schedule(SubjectId::new("cam-2"), daytime());

        clock.set(at(9, 0));
        assert_eq!(engine.force_check(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (clock, engine) = engine_at(7, 0);
        let (seen, sub) = collect(&engine);
        engine.set_schedule(cam(), daytime());

        assert!(sub.unsubscribe());
        clock.set(at(9, 0));
        engine.force_check();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn effective_settings_are_live() {
        let (clock, engine) = engine_at(7, 0);
        engine.set_schedule(cam(), daytime());

        let baseline = PolicySettings {
            block_events: true,
            ..PolicySettings::ALL_ALLOWED
        };
        assert_eq!(engine.get_effective_settings(&cam(), baseline), baseline);

        // No tick yet: the cached flag is stale but the answer is not
        clock.set(at(9, 0));
        assert!(!engine.is_active(&cam()));
        assert_eq!(
            engine.get_effective_settings(&cam(), baseline),
            PolicySettings::ALL_BLOCKED
        );
        assert_eq!(
            engine.get_effective_settings(&SubjectId::new("unknown"), baseline),
            baseline
        );
    }

    #[test]
    fn info_and_status() {
        let (_, engine) = engine_at(12, 0);
        engine.set_schedule(cam(), daytime());

        let mut night = daytime();
        night.start_time = WallClock::new(22, 0).unwrap();
        night.end_time = WallClock::new(6, 0).unwrap();
        engine.set_schedule(SubjectId::new("cam-2"), night);

        let info = engine.get_info(&cam()).unwrap();
        assert!(info.is_active);
        assert_eq!(info.next_change, Some(at(22, 0)));
        assert_eq!(info.description, "Daily 08:00-22:00");

        assert_eq!(engine.get_active_list(), vec![cam()]);

        let status = engine.get_status();
        assert_eq!(status.total_schedules, 2);
        assert_eq!(status.active_schedules, 1);
        assert_eq!(status.entries[1].description, "Daily 22:00-06:00 (overnight)");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drives_ticks_until_stopped() {
        let (clock, engine) = engine_at(7, 59);
        let (seen, _sub) = collect(&engine);
        engine.set_schedule(cam(), daytime());

        engine.start();
        engine.start();
        assert!(engine.is_running());

        clock.set(at(8, 0));
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        engine.stop();
        engine.stop();
        assert!(!engine.is_running());

        clock.set(at(22, 30));
        tokio::time::sleep(DEFAULT_CHECK_INTERVAL * 3).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
