//! Effective policy resolution
//!
//! Precedence, first match wins:
//! 1. global override: everything blocked
//! 2. subject disabled: everything allowed
//! 3. member of the active profile: the profile's settings
//! 4. schedule active now: the schedule's settings
//! 5. otherwise: the manual baseline

use serde::Serialize;
use warden_api::{PolicySettings, PolicySource, Profile};

/// Everything the resolver looks at for one subject
#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs<'a> {
    pub global_override: bool,
    pub subject_enabled: bool,
    pub active_profile: Option<&'a Profile>,
    /// The schedule's settings when the subject's schedule applies right now
    pub active_schedule: Option<PolicySettings>,
    pub manual: PolicySettings,
}

/// A resolved policy and the rule that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub settings: PolicySettings,
    pub source: PolicySource,
    /// Set when `source` is `Profile`
    pub profile_name: Option<String>,
}

impl Resolution {
    fn from_source(settings: PolicySettings, source: PolicySource) -> Self {
        Self {
            settings,
            source,
            profile_name: None,
        }
    }
}

/// Resolve the effective policy. Pure; call again whenever an input changes.
pub fn resolve(inputs: &PolicyInputs<'_>) -> Resolution {
    if inputs.global_override {
        return Resolution::from_source(PolicySettings::ALL_BLOCKED, PolicySource::Override);
    }

    if !inputs.subject_enabled {
        return Resolution::from_source(PolicySettings::ALL_ALLOWED, PolicySource::Disabled);
    }

    if let Some(profile) = inputs.active_profile {
        return Resolution {
            settings: profile.settings,
            source: PolicySource::Profile,
            profile_name: Some(profile.name.clone()),
        };
    }

    match inputs.active_schedule {
        Some(settings) => Resolution::from_source(settings, PolicySource::Schedule),
        None => Resolution::from_source(inputs.manual, PolicySource::Manual),
    }
}

/// Positional form of [`resolve`] returning only the settings.
///
/// `schedule_effective` is the schedule's settings when active, otherwise
/// the manual baseline.
pub fn resolve_settings(
    global_override: bool,
    subject_enabled: bool,
    schedule_effective: PolicySettings,
    active_profile: Option<&Profile>,
) -> PolicySettings {
    resolve(&PolicyInputs {
        global_override,
        subject_enabled,
        active_profile,
        active_schedule: Some(schedule_effective),
        manual: schedule_effective,
    })
    .settings
}
