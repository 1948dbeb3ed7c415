//! Narrow notification capability handed to the coordinator

use std::sync::Mutex;
use warden_api::{PolicySettings, PolicySource, Profile, ScheduleEdge, Trigger};
use warden_util::{ProfileId, SubjectId};

use crate::ScheduleChange;

/// One subject's effective policy moving from `previous` to `settings`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyChange {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub previous: Option<PolicySettings>,
    pub settings: PolicySettings,
    pub source: PolicySource,
    pub trigger: Trigger,
    pub profile_name: Option<String>,
}

/// Receives policy events after they have taken effect.
///
/// Implementations must not fail or block: the change has already been
/// applied and audited by the time they are called.
pub trait PolicyObserver: Send + Sync {
    fn policy_changed(&self, change: &PolicyChange);

    fn profile_changed(&self, profile: &Profile, active: bool);

    fn override_changed(&self, active: bool);

    fn schedule_triggered(&self, subject_name: &str, change: &ScheduleChange);
}

/// What a [`RecordingObserver`] saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Policy(PolicyChange),
    Profile { id: ProfileId, active: bool },
    Override(bool),
    Schedule { subject_id: SubjectId, edge: ScheduleEdge },
}

/// Observer that keeps every event, for tests
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl PolicyObserver for RecordingObserver {
    fn policy_changed(&self, change: &PolicyChange) {
        self.push(ObservedEvent::Policy(change.clone()));
    }

    fn profile_changed(&self, profile: &Profile, active: bool) {
        self.push(ObservedEvent::Profile {
            id: profile.id.clone(),
            active,
        });
    }

    fn override_changed(&self, active: bool) {
        self.push(ObservedEvent::Override(active));
    }

    fn schedule_triggered(&self, _subject_name: &str, change: &ScheduleChange) {
        self.push(ObservedEvent::Schedule {
            subject_id: change.subject_id.clone(),
            edge: change.reason,
        });
    }
}
