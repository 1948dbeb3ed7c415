//! Named profiles with a single-active invariant

use std::collections::HashSet;
use thiserror::Error;
use tracing::info;
use warden_api::Profile;
use warden_util::{ProfileId, SubjectId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("Profile not found: {0}")]
    NotFound(ProfileId),

    #[error("Duplicate profile ID: {0}")]
    Duplicate(ProfileId),

    #[error("More than one profile is active: {0:?}")]
    MultipleActive(Vec<ProfileId>),

    #[error("Subject {subject} belongs to more than one active profile: {profiles:?}")]
    MembershipConflict {
        subject: SubjectId,
        profiles: Vec<ProfileId>,
    },
}

pub type ProfileResult<T> = Result<T, ProfileError>;

/// All configured profiles. At most one is active at a time.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<Profile>,
}

impl ProfileSet {
    pub fn new(profiles: Vec<Profile>) -> ProfileResult<Self> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(&profile.id) {
                return Err(ProfileError::Duplicate(profile.id.clone()));
            }
        }

        let active: Vec<ProfileId> = profiles
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id.clone())
            .collect();
        if active.len() > 1 {
            return Err(ProfileError::MultipleActive(active));
        }

        Ok(Self { profiles })
    }

    pub fn all(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn get(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| &p.id == id)
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.active)
    }

    /// Activate `id`, deactivating every other profile first
    pub fn activate(&mut self, id: &ProfileId) -> ProfileResult<&Profile> {
        let index = self
            .profiles
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.clone()))?;

        for profile in self.profiles.iter_mut() {
            profile.active = false;
        }
        self.profiles[index].active = true;

        info!(profile = %id, "Profile activated");
        Ok(&self.profiles[index])
    }

    /// Deactivate `id`. Returns whether it was active.
    pub fn deactivate(&mut self, id: &ProfileId) -> ProfileResult<bool> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.clone()))?;

        let was_active = profile.active;
        profile.active = false;
        if was_active {
            info!(profile = %id, "Profile deactivated");
        }
        Ok(was_active)
    }

    pub fn deactivate_all(&mut self) {
        for profile in self.profiles.iter_mut() {
            profile.active = false;
        }
    }

    /// The active profile `subject` belongs to, if any.
    ///
    /// Membership in more than one active profile is reported, never
    /// resolved by picking one.
    pub fn active_profile_for(&self, subject: &SubjectId) -> ProfileResult<Option<&Profile>> {
        let matching: Vec<&Profile> = self
            .profiles
            .iter()
            .filter(|p| p.active && p.is_member(subject))
            .collect();

        match matching.as_slice() {
            [] => Ok(None),
            [profile] => Ok(Some(*profile)),
            many => Err(ProfileError::MembershipConflict {
                subject: subject.clone(),
                profiles: many.iter().map(|p| p.id.clone()).collect(),
            }),
        }
    }
}
