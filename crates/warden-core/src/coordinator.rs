//! Policy coordinator: the one context object that owns policy state
//!
//! Holds the global override, the profile set and per-subject state, and
//! shares the schedule engine, audit log and observer with the rest of the
//! service. Every input change re-resolves the affected subjects; each
//! subject whose effective policy moved is applied to its device, audited
//! once, and then reported to the observer.
//!
//! Lock order is coordinator state, then engine registry, then audit log.
//! Engine calls that can fire listeners (`set_schedule`) are made with the
//! coordinator lock released, since listeners call back in here.

use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use warden_api::{PolicySettings, PolicySource, Profile, RecordingBlockStrategy, Schedule, Trigger};
use warden_config::SubjectConfig;
use warden_device_api::{DeviceAdapter, GatedDevice};
use warden_store::{AuditLog, KeyValueStore, Transition, get_flag, keys};
use warden_util::{ProfileId, SubjectId, WardenError};

use crate::{
    PolicyChange, PolicyInputs, PolicyObserver, ProfileError, ProfileSet, Resolution,
    ScheduleChange, ScheduleEngine, ScheduleInfo, Subscription, resolve,
};

impl From<ProfileError> for WardenError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::NotFound(id) => WardenError::ProfileNotFound(id),
            other => WardenError::validation(other.to_string()),
        }
    }
}

/// What a subject is registered with
#[derive(Debug, Clone)]
pub struct SubjectRegistration {
    pub id: SubjectId,
    pub name: String,
    pub enabled: bool,
    pub manual: PolicySettings,
    pub recording_block: RecordingBlockStrategy,
    pub schedule: Option<Schedule>,
}

impl SubjectRegistration {
    pub fn new(id: impl Into<SubjectId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            manual: PolicySettings::ALL_ALLOWED,
            recording_block: RecordingBlockStrategy::default(),
            schedule: None,
        }
    }

    pub fn with_manual(mut self, manual: PolicySettings) -> Self {
        self.manual = manual;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl From<&SubjectConfig> for SubjectRegistration {
    fn from(config: &SubjectConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            enabled: config.enabled,
            manual: config.manual,
            recording_block: config.recording_block,
            schedule: config.schedule.clone(),
        }
    }
}

/// Why a subject's policy is what it is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStatus {
    pub subject_id: SubjectId,
    pub name: String,
    pub enabled: bool,
    pub manual: PolicySettings,
    pub effective: PolicySettings,
    pub source: PolicySource,
    pub profile_name: Option<String>,
    pub schedule: Option<ScheduleInfo>,
    pub recording_block: Option<RecordingBlockStrategy>,
    pub device_healthy: Option<bool>,
}

struct SubjectState {
    name: String,
    enabled: bool,
    manual: PolicySettings,
    /// Last policy applied; `None` until first resolved
    effective: Option<PolicySettings>,
    device: Option<GatedDevice>,
}

impl SubjectState {
    fn apply(&self, subject_id: &SubjectId, settings: &PolicySettings) {
        let Some(device) = &self.device else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| device.apply(settings))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(subject_id = %subject_id, error = %e, "Device did not accept policy");
            }
            Err(_) => {
                error!(subject_id = %subject_id, "Device adapter panicked while applying policy");
            }
        }
    }
}

struct CoordinatorState {
    global_override: bool,
    profiles: ProfileSet,
    subjects: BTreeMap<SubjectId, SubjectState>,
}

/// What caused a re-evaluation
struct Cause {
    trigger: Trigger,
    profile_name: Option<String>,
}

impl Cause {
    fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            profile_name: None,
        }
    }

    fn profile(name: &str) -> Self {
        Self {
            trigger: Trigger::Profile,
            profile_name: Some(name.to_string()),
        }
    }
}

pub struct PolicyCoordinator {
    state: Mutex<CoordinatorState>,
    engine: Arc<ScheduleEngine>,
    audit: Arc<AuditLog>,
    store: Arc<dyn KeyValueStore>,
    observer: Arc<dyn PolicyObserver>,
}

impl PolicyCoordinator {
    /// Build the coordinator and restore the persisted override and active
    /// profile. Missing or malformed persisted values keep the configured state.
    pub fn new(
        mut profiles: ProfileSet,
        engine: Arc<ScheduleEngine>,
        audit: Arc<AuditLog>,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn PolicyObserver>,
    ) -> Self {
        let global_override = get_flag(store.as_ref(), keys::GLOBAL_OVERRIDE, false);
        restore_active_profile(&mut profiles, store.as_ref());

        info!(
            global_override,
            active_profile = profiles.active_profile().map(|p| p.id.as_str()),
            "Policy coordinator initialized"
        );

        Self {
            state: Mutex::new(CoordinatorState {
                global_override,
                profiles,
                subjects: BTreeMap::new(),
            }),
            engine,
            audit,
            store,
            observer,
        }
    }

    pub fn engine(&self) -> &Arc<ScheduleEngine> {
        &self.engine
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Route schedule edges from the engine into this coordinator.
    ///
    /// The engine only holds a weak reference back.
    pub fn subscribe_to_schedules(self: &Arc<Self>) -> Subscription {
        let coordinator = Arc::downgrade(self);
        self.engine.on_change(move |change| match coordinator.upgrade() {
            Some(coordinator) => coordinator.handle_schedule_change(change),
            None => Ok(()),
        })
    }

    // Subjects

    /// Register a subject and apply its initial policy. The initial policy
    /// is not a transition: nothing is audited or reported.
    pub fn register_subject(
        &self,
        registration: SubjectRegistration,
        device: Option<Arc<dyn DeviceAdapter>>,
    ) -> Result<PolicySettings, WardenError> {
        let id = registration.id.clone();
        if self.lock().subjects.contains_key(&id) {
            return Err(WardenError::validation(format!(
                "Subject already registered: {}",
                id
            )));
        }

        match registration.schedule {
            Some(schedule) => self.engine.set_schedule(id.clone(), schedule),
            None => {
                self.engine.remove_schedule(&id);
            }
        }

        let mut state = self.lock();
        let device = device.map(|d| GatedDevice::new(d, registration.recording_block));
        state.subjects.insert(
            id.clone(),
            SubjectState {
                name: registration.name,
                enabled: registration.enabled,
                manual: registration.manual,
                effective: None,
                device,
            },
        );

        let resolution = self.resolve_locked(&state, &id)?;
        if let Some(subject) = state.subjects.get_mut(&id) {
            subject.effective = Some(resolution.settings);
            subject.apply(&id, &resolution.settings);
        }

        info!(subject_id = %id, source = ?resolution.source, "Subject registered");
        Ok(resolution.settings)
    }

    pub fn release_subject(&self, subject_id: &SubjectId) -> Result<(), WardenError> {
        if self.lock().subjects.remove(subject_id).is_none() {
            return Err(WardenError::SubjectNotFound(subject_id.clone()));
        }
        self.engine.remove_schedule(subject_id);
        info!(subject_id = %subject_id, "Subject released");
        Ok(())
    }

    pub fn subject_ids(&self) -> Vec<SubjectId> {
        self.lock().subjects.keys().cloned().collect()
    }

    // Global override

    pub fn global_override(&self) -> bool {
        self.lock().global_override
    }

    pub fn set_global_override(&self, active: bool) -> Vec<PolicyChange> {
        let changes = {
            let mut state = self.lock();
            if state.global_override == active {
                return Vec::new();
            }
            state.global_override = active;
            self.persist(keys::GLOBAL_OVERRIDE, if active { "true" } else { "false" });
            self.audit.log_panic(active);

            let all: Vec<SubjectId> = state.subjects.keys().cloned().collect();
            self.reevaluate_locked(&mut state, &all, &Cause::new(Trigger::Panic))
        };

        if active {
            warn!(affected = changes.len(), "Global override engaged");
        } else {
            info!(affected = changes.len(), "Global override released");
        }

        self.observer.override_changed(active);
        self.publish(&changes);
        changes
    }

    // Profiles

    pub fn profiles(&self) -> Vec<Profile> {
        self.lock().profiles.all().to_vec()
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.lock().profiles.active_profile().cloned()
    }

    /// Activate a profile, deactivating whichever one was active
    pub fn activate_profile(&self, id: &ProfileId) -> Result<Vec<PolicyChange>, WardenError> {
        let (previous, profile, changes) = {
            let mut state = self.lock();

            let previous = state.profiles.active_profile().cloned();
            if previous.as_ref().is_some_and(|p| &p.id == id) {
                return Ok(Vec::new());
            }

            let profile = state.profiles.activate(id)?.clone();
            self.persist(keys::ACTIVE_PROFILE, id.as_str());

            let affected: Vec<SubjectId> = previous
                .as_ref()
                .map(|p| p.member_ids.clone())
                .unwrap_or_default()
                .union(&profile.member_ids)
                .cloned()
                .collect();
            let changes =
                self.reevaluate_locked(&mut state, &affected, &Cause::profile(&profile.name));
            (previous, profile, changes)
        };

        if let Some(previous) = &previous {
            self.observer.profile_changed(previous, false);
        }
        self.observer.profile_changed(&profile, true);
        self.publish(&changes);
        Ok(changes)
    }

    pub fn deactivate_profile(&self, id: &ProfileId) -> Result<Vec<PolicyChange>, WardenError> {
        let (profile, changes) = {
            let mut state = self.lock();

            if !state.profiles.deactivate(id)? {
                return Ok(Vec::new());
            }
            self.persist(keys::ACTIVE_PROFILE, "");

            let profile = state
                .profiles
                .get(id)
                .cloned()
                .ok_or_else(|| WardenError::ProfileNotFound(id.clone()))?;
            let members: Vec<SubjectId> = profile.member_ids.iter().cloned().collect();
            let changes =
                self.reevaluate_locked(&mut state, &members, &Cause::profile(&profile.name));
            (profile, changes)
        };

        self.observer.profile_changed(&profile, false);
        self.publish(&changes);
        Ok(changes)
    }

    // Per-subject inputs

    pub fn set_manual_settings(
        &self,
        subject_id: &SubjectId,
        settings: PolicySettings,
    ) -> Result<Vec<PolicyChange>, WardenError> {
        self.update_subject(subject_id, |subject| subject.manual = settings)
    }

    pub fn set_subject_enabled(
        &self,
        subject_id: &SubjectId,
        enabled: bool,
    ) -> Result<Vec<PolicyChange>, WardenError> {
        self.update_subject(subject_id, |subject| subject.enabled = enabled)
    }

    /// Replace a subject's schedule. If the new schedule is already inside
    /// its window the engine's start edge applies it before this returns.
    pub fn set_schedule(
        &self,
        subject_id: &SubjectId,
        schedule: Schedule,
    ) -> Result<Vec<PolicyChange>, WardenError> {
        self.ensure_registered(subject_id)?;
        self.engine.set_schedule(subject_id.clone(), schedule);
        Ok(self.reevaluate_one(subject_id, Cause::new(Trigger::Schedule)))
    }

    pub fn remove_schedule(&self, subject_id: &SubjectId) -> Result<Vec<PolicyChange>, WardenError> {
        self.ensure_registered(subject_id)?;
        self.engine.remove_schedule(subject_id);
        Ok(self.reevaluate_one(subject_id, Cause::new(Trigger::Schedule)))
    }

    /// Schedule edge from the engine
    pub fn handle_schedule_change(&self, change: &ScheduleChange) -> Result<(), WardenError> {
        let (name, changes) = {
            let mut state = self.lock();
            let name = state
                .subjects
                .get(&change.subject_id)
                .map(|s| s.name.clone())
                .ok_or_else(|| WardenError::SubjectNotFound(change.subject_id.clone()))?;

            let changes = self.reevaluate_locked(
                &mut state,
                std::slice::from_ref(&change.subject_id),
                &Cause::new(Trigger::Schedule),
            );
            (name, changes)
        };

        debug!(
            subject_id = %change.subject_id,
            reason = %change.reason,
            changed = !changes.is_empty(),
            "Schedule edge handled"
        );

        self.observer.schedule_triggered(&name, change);
        self.publish(&changes);
        Ok(())
    }

    // Queries

    /// Resolve a subject's policy from current inputs
    pub fn effective_policy(&self, subject_id: &SubjectId) -> Result<Resolution, WardenError> {
        let state = self.lock();
        self.resolve_locked(&state, subject_id)
    }

    pub fn subject_status(&self, subject_id: &SubjectId) -> Result<SubjectStatus, WardenError> {
        let state = self.lock();
        let resolution = self.resolve_locked(&state, subject_id)?;
        let subject = state
            .subjects
            .get(subject_id)
            .ok_or_else(|| WardenError::SubjectNotFound(subject_id.clone()))?;

        Ok(SubjectStatus {
            subject_id: subject_id.clone(),
            name: subject.name.clone(),
            enabled: subject.enabled,
            manual: subject.manual,
            effective: resolution.settings,
            source: resolution.source,
            profile_name: resolution.profile_name,
            schedule: self.engine.get_info(subject_id),
            recording_block: subject.device.as_ref().map(|d| d.recording_strategy()),
            device_healthy: subject.device.as_ref().map(|d| d.is_healthy()),
        })
    }

    // Internals

    /// State stays consistent across a panic in a callee, so a poisoned
    /// lock is taken over rather than propagated.
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_registered(&self, subject_id: &SubjectId) -> Result<(), WardenError> {
        if self.lock().subjects.contains_key(subject_id) {
            Ok(())
        } else {
            Err(WardenError::SubjectNotFound(subject_id.clone()))
        }
    }

    fn update_subject(
        &self,
        subject_id: &SubjectId,
        update: impl FnOnce(&mut SubjectState),
    ) -> Result<Vec<PolicyChange>, WardenError> {
        let changes = {
            let mut state = self.lock();
            let subject = state
                .subjects
                .get_mut(subject_id)
                .ok_or_else(|| WardenError::SubjectNotFound(subject_id.clone()))?;
            update(subject);

            self.reevaluate_locked(
                &mut state,
                std::slice::from_ref(subject_id),
                &Cause::new(Trigger::Manual),
            )
        };

        self.publish(&changes);
        Ok(changes)
    }

    fn reevaluate_one(&self, subject_id: &SubjectId, cause: Cause) -> Vec<PolicyChange> {
        let changes = {
            let mut state = self.lock();
            self.reevaluate_locked(&mut state, std::slice::from_ref(subject_id), &cause)
        };
        self.publish(&changes);
        changes
    }

    fn resolve_locked(
        &self,
        state: &CoordinatorState,
        subject_id: &SubjectId,
    ) -> Result<Resolution, WardenError> {
        let subject = state
            .subjects
            .get(subject_id)
            .ok_or_else(|| WardenError::SubjectNotFound(subject_id.clone()))?;

        let active_profile = match state.profiles.active_profile_for(subject_id) {
            Ok(profile) => profile,
            Err(e) => {
                error!(subject_id = %subject_id, error = %e, "Ignoring conflicting profile membership");
                None
            }
        };

        Ok(resolve(&PolicyInputs {
            global_override: state.global_override,
            subject_enabled: subject.enabled,
            active_profile,
            active_schedule: self.engine.active_settings(subject_id),
            manual: subject.manual,
        }))
    }

    /// Re-resolve `subjects`; apply and audit the ones that changed
    fn reevaluate_locked(
        &self,
        state: &mut CoordinatorState,
        subjects: &[SubjectId],
        cause: &Cause,
    ) -> Vec<PolicyChange> {
        let mut changes = Vec::new();

        for subject_id in subjects {
            let Ok(resolution) = self.resolve_locked(state, subject_id) else {
                continue;
            };
            let Some(subject) = state.subjects.get_mut(subject_id) else {
                continue;
            };
            if subject.effective == Some(resolution.settings) {
                continue;
            }

            let previous = subject.effective.replace(resolution.settings);
            subject.apply(subject_id, &resolution.settings);

            let mut transition = Transition::new(cause.trigger, resolution.settings)
                .for_subject(subject_id.clone(), subject.name.clone())
                .with_previous(previous);
            if let Some(profile) = &cause.profile_name {
                transition = transition.with_profile(profile.clone());
            }
            self.audit.log(transition);

            info!(
                subject_id = %subject_id,
                trigger = %cause.trigger,
                source = ?resolution.source,
                "Effective policy changed"
            );

            changes.push(PolicyChange {
                subject_id: subject_id.clone(),
                subject_name: subject.name.clone(),
                previous,
                settings: resolution.settings,
                source: resolution.source,
                trigger: cause.trigger,
                profile_name: cause.profile_name.clone(),
            });
        }

        changes
    }

    fn publish(&self, changes: &[PolicyChange]) {
        for change in changes {
            self.observer.policy_changed(change);
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Failed to persist policy state");
        }
    }
}

/// Apply the persisted active profile, if it names a known one.
/// An empty value means the operator deactivated every profile.
fn restore_active_profile(profiles: &mut ProfileSet, store: &dyn KeyValueStore) {
    let stored = match store.get(keys::ACTIVE_PROFILE) {
        Ok(Some(value)) => value,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "Failed to read active profile; keeping configured state");
            return;
        }
    };

    let stored = stored.trim();
    if stored.is_empty() {
        profiles.deactivate_all();
        return;
    }

    let id = ProfileId::new(stored);
    if let Err(e) = profiles.activate(&id) {
        warn!(profile = stored, error = %e, "Ignoring persisted active profile");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObservedEvent, RecordingObserver};
    use chrono::{DateTime, Local, TimeZone};
    use std::collections::BTreeSet;
    use warden_api::{PolicyField, ScheduleEdge, ScheduleKind};
    use warden_device_api::{DeviceCapabilities, DeviceResult, MockDevice};
    use warden_store::MemoryStore;
    use warden_util::{ManualClock, WallClock};

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 6, h, m, 0).unwrap()
    }

    fn daytime_block() -> Schedule {
        Schedule::new(
            ScheduleKind::Daily,
            WallClock::new(8, 0).unwrap(),
            WallClock::new(22, 0).unwrap(),
            PolicySettings::ALL_BLOCKED,
        )
    }

    fn away_settings() -> PolicySettings {
        PolicySettings {
            block_streaming: true,
            ..PolicySettings::ALL_ALLOWED
        }
    }

    fn away() -> Profile {
        Profile {
            id: ProfileId::new("away"),
            name: "Away Mode".into(),
            member_ids: BTreeSet::from([SubjectId::new("cam-1")]),
            settings: away_settings(),
            active: false,
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        observer: Arc<RecordingObserver>,
        device: Arc<MockDevice>,
        coordinator: Arc<PolicyCoordinator>,
        _subscription: Subscription,
    }

    fn cam1() -> SubjectId {
        SubjectId::new("cam-1")
    }

    fn cam2() -> SubjectId {
        SubjectId::new("cam-2")
    }

    fn build(clock: Arc<ManualClock>, store: Arc<MemoryStore>, profiles: Vec<Profile>) -> Fixture {
        let engine = Arc::new(ScheduleEngine::new(clock.clone(), crate::DEFAULT_CHECK_INTERVAL));
        let audit = Arc::new(AuditLog::new(store.clone(), clock.clone()));
        let observer = Arc::new(RecordingObserver::new());
        let coordinator = Arc::new(PolicyCoordinator::new(
            ProfileSet::new(profiles).unwrap(),
            engine,
            audit,
            store.clone(),
            observer.clone(),
        ));
        let subscription = coordinator.subscribe_to_schedules();

        let device = Arc::new(MockDevice::new(DeviceCapabilities::camera()));
        coordinator
            .register_subject(
                SubjectRegistration::new("cam-1", "Front Door").with_schedule(daytime_block()),
                Some(device.clone()),
            )
            .unwrap();
        coordinator
            .register_subject(
                SubjectRegistration::new("cam-2", "Porch").with_manual(PolicySettings {
                    block_events: true,
                    ..PolicySettings::ALL_ALLOWED
                }),
                None,
            )
            .unwrap();

        Fixture {
            clock,
            store,
            observer,
            device,
            coordinator,
            _subscription: subscription,
        }
    }

    fn fixture_at(h: u32, m: u32) -> Fixture {
        build(
            Arc::new(ManualClock::new(at(h, m))),
            Arc::new(MemoryStore::new()),
            vec![away()],
        )
    }

    #[test]
    fn registration_applies_without_auditing() {
        let f = fixture_at(7, 59);

        assert!(f.coordinator.audit().get_logs().is_empty());
        assert!(f.observer.events().is_empty());
        assert_eq!(f.device.indicator(PolicyField::Recording), Some(true));

        let err = f
            .coordinator
            .register_subject(SubjectRegistration::new("cam-1", "Again"), None)
            .unwrap_err();
        assert!(matches!(err, WardenError::ValidationError(_)));
    }

    #[test]
    fn schedule_edge_applies_audits_and_notifies() {
        let f = fixture_at(7, 59);

        f.clock.set(at(8, 0));
        assert_eq!(f.coordinator.engine().force_check(), 1);

        let logs = f.coordinator.audit().get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trigger, Trigger::Schedule);
        assert_eq!(logs[0].new_settings, PolicySettings::ALL_BLOCKED);
        assert_eq!(logs[0].previous_settings, Some(PolicySettings::ALL_ALLOWED));

        assert_eq!(f.device.indicator(PolicyField::Recording), Some(false));
        assert_eq!(
            f.observer.events(),
            vec![
                ObservedEvent::Schedule {
                    subject_id: cam1(),
                    edge: ScheduleEdge::ScheduleStart,
                },
                ObservedEvent::Policy(PolicyChange {
                    subject_id: cam1(),
                    subject_name: "Front Door".into(),
                    previous: Some(PolicySettings::ALL_ALLOWED),
                    settings: PolicySettings::ALL_BLOCKED,
                    source: PolicySource::Schedule,
                    trigger: Trigger::Schedule,
                    profile_name: None,
                }),
            ]
        );
    }

    #[test]
    fn override_dominates_and_releases() {
        let f = fixture_at(12, 0);

        let changes = f.coordinator.set_global_override(true);
        // cam-1 is already fully blocked by its schedule
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].subject_id, cam2());
        assert_eq!(changes[0].trigger, Trigger::Panic);
        assert!(f.coordinator.set_global_override(true).is_empty());

        for id in [cam1(), cam2()] {
            let resolution = f.coordinator.effective_policy(&id).unwrap();
            assert_eq!(resolution.settings, PolicySettings::ALL_BLOCKED);
            assert_eq!(resolution.source, PolicySource::Override);
        }

        // Schedule end under override changes nothing but is still reported
        f.clock.set(at(22, 0));
        f.coordinator.engine().force_check();
        assert!(f.observer.events().contains(&ObservedEvent::Schedule {
            subject_id: cam1(),
            edge: ScheduleEdge::ScheduleEnd,
        }));

        let changes = f.coordinator.set_global_override(false);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            f.coordinator.effective_policy(&cam1()).unwrap().settings,
            PolicySettings::ALL_ALLOWED
        );

        let logs = f.coordinator.audit().get_logs();
        let panic_entries = logs.iter().filter(|e| e.trigger == Trigger::Panic).count();
        // two global entries plus three subject transitions
        assert_eq!(panic_entries, 5);
        assert_eq!(f.store.get(keys::GLOBAL_OVERRIDE).unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn profile_outranks_schedule() {
        let f = fixture_at(12, 0);
        let away_id = ProfileId::new("away");

        let changes = f.coordinator.activate_profile(&away_id).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].settings, away_settings());
        assert_eq!(changes[0].source, PolicySource::Profile);

        let logs = f.coordinator.audit().get_logs();
        assert_eq!(logs[0].trigger, Trigger::Profile);
        assert_eq!(logs[0].profile_name.as_deref(), Some("Away Mode"));
        assert!(logs[0].export_line().contains("PROFILE(Away Mode): Front Door"));

        // cam-2 is not a member
        assert_eq!(
            f.coordinator.effective_policy(&cam2()).unwrap().source,
            PolicySource::Manual
        );

        assert!(f.coordinator.activate_profile(&away_id).unwrap().is_empty());

        let changes = f.coordinator.deactivate_profile(&away_id).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].settings, PolicySettings::ALL_BLOCKED);
        assert_eq!(changes[0].source, PolicySource::Schedule);
        assert!(f.coordinator.deactivate_profile(&away_id).unwrap().is_empty());

        assert!(f.observer.events().contains(&ObservedEvent::Profile {
            id: away_id.clone(),
            active: false,
        }));
        assert!(matches!(
            f.coordinator.activate_profile(&ProfileId::new("ghost")),
            Err(WardenError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn disabled_subject_passes_everything() {
        let f = fixture_at(12, 0);

        let changes = f.coordinator.set_subject_enabled(&cam1(), false).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].settings, PolicySettings::ALL_ALLOWED);
        assert_eq!(changes[0].source, PolicySource::Disabled);
        assert_eq!(changes[0].trigger, Trigger::Manual);
        assert_eq!(f.device.indicator(PolicyField::Recording), Some(true));
    }

    #[test]
    fn manual_edit_only_audits_real_changes() {
        let f = fixture_at(7, 0);
        let manual = PolicySettings {
            block_detection: true,
            ..PolicySettings::ALL_ALLOWED
        };

        assert_eq!(f.coordinator.set_manual_settings(&cam2(), manual).unwrap().len(), 1);
        assert!(f.coordinator.set_manual_settings(&cam2(), manual).unwrap().is_empty());
        assert_eq!(f.coordinator.audit().get_logs().len(), 1);

        assert!(matches!(
            f.coordinator.set_manual_settings(&SubjectId::new("ghost"), manual),
            Err(WardenError::SubjectNotFound(_))
        ));
    }

    #[test]
    fn schedule_set_inside_window_audits_once() {
        let f = fixture_at(12, 0);

        let changes = f.coordinator.set_schedule(&cam2(), daytime_block()).unwrap();
        assert_eq!(changes.len(), 1);

        let logs = f.coordinator.audit().get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trigger, Trigger::Schedule);

        // Replacing an inactive schedule with an active one goes through the edge
        let mut disabled = daytime_block();
        disabled.enabled = false;
        f.coordinator.set_schedule(&cam1(), disabled).unwrap();
        f.coordinator.set_schedule(&cam1(), daytime_block()).unwrap();

        let cam1_entries = f.coordinator.audit().get_logs_for_subject(&cam1());
        assert_eq!(cam1_entries.len(), 2);
        assert!(cam1_entries.iter().all(|e| e.trigger == Trigger::Schedule));

        f.coordinator.remove_schedule(&cam1()).unwrap();
        assert_eq!(
            f.coordinator.effective_policy(&cam1()).unwrap().source,
            PolicySource::Manual
        );
    }

    #[test]
    fn status_explains_source() {
        let f = fixture_at(12, 0);

        let status = f.coordinator.subject_status(&cam1()).unwrap();
        assert_eq!(status.source, PolicySource::Schedule);
        assert_eq!(status.effective, PolicySettings::ALL_BLOCKED);
        assert_eq!(status.recording_block, Some(RecordingBlockStrategy::IndicatorFlag));
        assert_eq!(status.device_healthy, Some(true));
        assert_eq!(status.schedule.unwrap().description, "Daily 08:00-22:00");

        let status = f.coordinator.subject_status(&cam2()).unwrap();
        assert!(status.schedule.is_none());
        assert!(status.recording_block.is_none());
    }

    #[test]
    fn persisted_state_is_restored() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::GLOBAL_OVERRIDE, "true").unwrap();
        store.set(keys::ACTIVE_PROFILE, "away").unwrap();

        let f = build(Arc::new(ManualClock::new(at(7, 0))), store, vec![away()]);
        assert!(f.coordinator.global_override());
        assert_eq!(f.coordinator.active_profile().unwrap().id, ProfileId::new("away"));
    }

    #[test]
    fn malformed_persisted_state_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::GLOBAL_OVERRIDE, "maybe").unwrap();
        store.set(keys::ACTIVE_PROFILE, "ghost").unwrap();

        let mut configured_active = away();
        configured_active.active = true;
        let f = build(
            Arc::new(ManualClock::new(at(7, 0))),
            store,
            vec![configured_active],
        );

        assert!(!f.coordinator.global_override());
        assert_eq!(f.coordinator.active_profile().unwrap().id, ProfileId::new("away"));
    }

    #[test]
    fn cleared_profile_stays_cleared() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::ACTIVE_PROFILE, "").unwrap();

        let mut configured_active = away();
        configured_active.active = true;
        let f = build(
            Arc::new(ManualClock::new(at(7, 0))),
            store,
            vec![configured_active],
        );
        assert!(f.coordinator.active_profile().is_none());
    }

    #[test]
    fn audit_failure_does_not_block_policy() {
        let f = fixture_at(7, 0);
        f.store.set_fail_writes(true);

        let changes = f.coordinator.set_global_override(true);
        assert_eq!(changes.len(), 2);
        assert!(f.coordinator.global_override());
        assert_eq!(f.device.indicator(PolicyField::Streaming), Some(false));
    }

    struct PanickingDevice;

    impl DeviceAdapter for PanickingDevice {
        fn capabilities(&self) -> DeviceCapabilities {
            DeviceCapabilities::camera()
        }

        fn set_indicator(&self, _field: PolicyField, _allowed: bool) -> DeviceResult<()> {
            panic!("firmware fault");
        }
    }

    #[test]
    fn panicking_device_does_not_wedge_coordinator() {
        let f = fixture_at(7, 59);
        f.coordinator
            .register_subject(
                SubjectRegistration::new("cam-3", "Side Gate").with_schedule(daytime_block()),
                Some(Arc::new(PanickingDevice)),
            )
            .unwrap();
        let cam3 = SubjectId::new("cam-3");

        f.clock.set(at(8, 0));
        assert_eq!(f.coordinator.engine().force_check(), 2);
        assert_eq!(f.coordinator.audit().get_logs_for_subject(&cam3).len(), 1);

        // The override still wins and later edges are still handled
        let changes = f.coordinator.set_global_override(true);
        assert!(changes.iter().any(|c| c.subject_id == cam2()));
        assert_eq!(
            f.coordinator.effective_policy(&cam3).unwrap().source,
            PolicySource::Override
        );

        f.coordinator.set_global_override(false);
        f.clock.set(at(22, 0));
        assert_eq!(f.coordinator.engine().force_check(), 2);
        assert_eq!(
            f.coordinator.effective_policy(&cam3).unwrap().settings,
            PolicySettings::ALL_ALLOWED
        );
    }

    #[test]
    fn switching_profiles_reports_both() {
        let mut night = away();
        night.id = ProfileId::new("night");
        night.name = "Night".into();
        let f = build(
            Arc::new(ManualClock::new(at(12, 0))),
            Arc::new(MemoryStore::new()),
            vec![away(), night],
        );

        f.coordinator.activate_profile(&ProfileId::new("away")).unwrap();
        f.coordinator.activate_profile(&ProfileId::new("night")).unwrap();

        let profile_events: Vec<ObservedEvent> = f
            .observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, ObservedEvent::Profile { .. }))
            .collect();
        assert_eq!(
            profile_events,
            vec![
                ObservedEvent::Profile {
                    id: ProfileId::new("away"),
                    active: true,
                },
                ObservedEvent::Profile {
                    id: ProfileId::new("away"),
                    active: false,
                },
                ObservedEvent::Profile {
                    id: ProfileId::new("night"),
                    active: true,
                },
            ]
        );
        assert_eq!(f.coordinator.active_profile().unwrap().name, "Night");
    }

    #[test]
    fn released_subject_ignores_edges() {
        let f = fixture_at(7, 59);
        f.coordinator.release_subject(&cam1()).unwrap();
        assert!(f.coordinator.release_subject(&cam1()).is_err());

        f.clock.set(at(8, 0));
        assert_eq!(f.coordinator.engine().force_check(), 0);
        assert_eq!(f.coordinator.subject_ids(), vec![cam2()]);
    }
}
