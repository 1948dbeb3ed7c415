//! Policy transition audit log
//!
//! Entries are kept newest first and bounded two ways on every write: at
//! most [`MAX_ENTRIES`], and nothing older than the retention window. The
//! whole log is persisted as one JSON array under [`keys::AUDIT_LOG`].
//!
//! Persistence is best effort. A failed write is logged and the in-memory
//! log still reflects the new entry; the policy change that produced the
//! entry is never affected.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use warden_api::{PolicySettings, Trigger};
use warden_util::{Clock, SubjectId, format_datetime_full};

use crate::{KeyValueStore, StoreResult, keys};

/// Hard cap on retained entries
pub const MAX_ENTRIES: usize = 1000;

/// Retention window used when none is stored
pub use warden_api::DEFAULT_RETENTION_DAYS;

/// One recorded policy transition. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_settings: Option<PolicySettings>,

    pub new_settings: PolicySettings,

    pub trigger: Trigger,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

impl AuditEntry {
    /// Subject name, falling back to its id, or `Global` for subject-less entries
    pub fn subject_label(&self) -> &str {
        self.subject_name
            .as_deref()
            .or(self.subject_id.as_ref().map(|id| id.as_str()))
            .unwrap_or("Global")
    }

    /// Field-level diff against the previous settings, or the full state
    /// when there is nothing to diff against
    pub fn describe_change(&self) -> String {
        let Some(previous) = self.previous_settings else {
            return describe_state(&self.new_settings);
        };

        let changed = previous.changed_fields(&self.new_settings);
        if changed.is_empty() {
            return "No changes".to_string();
        }

        changed
            .into_iter()
            .map(|field| {
                let state = if self.new_settings.get(field) {
                    "blocked"
                } else {
                    "allowed"
                };
                format!("{} {}", field.label(), state)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `[YYYY-MM-DD HH:MM:SS] TRIGGER(profile): subject - change`
    pub fn export_line(&self) -> String {
        let trigger = self.trigger.as_str().to_uppercase();
        let trigger = match &self.profile_name {
            Some(profile) => format!("{}({})", trigger, profile),
            None => trigger,
        };

        format!(
            "[{}] {}: {} - {}",
            format_datetime_full(&self.timestamp),
            trigger,
            self.subject_label(),
            self.describe_change()
        )
    }
}

fn describe_state(settings: &PolicySettings) -> String {
    if settings.is_all_blocked() {
        return "All blocked".to_string();
    }
    if settings.is_all_allowed() {
        return "All allowed".to_string();
    }

    let blocked: Vec<_> = settings
        .blocked_fields()
        .into_iter()
        .map(|f| f.label())
        .collect();
    format!("Blocked: {}", blocked.join(", "))
}

/// An audit entry before the log stamps it with a time
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub subject_id: Option<SubjectId>,
    pub subject_name: Option<String>,
    pub previous_settings: Option<PolicySettings>,
    pub new_settings: PolicySettings,
    pub trigger: Trigger,
    pub profile_name: Option<String>,
}

impl Transition {
    pub fn new(trigger: Trigger, new_settings: PolicySettings) -> Self {
        Self {
            subject_id: None,
            subject_name: None,
            previous_settings: None,
            new_settings,
            trigger,
            profile_name: None,
        }
    }

    pub fn for_subject(mut self, id: SubjectId, name: impl Into<String>) -> Self {
        self.subject_id = Some(id);
        self.subject_name = Some(name.into());
        self
    }

    pub fn with_previous(mut self, previous: Option<PolicySettings>) -> Self {
        self.previous_settings = previous;
        self
    }

    pub fn with_profile(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    fn stamp(self, timestamp: DateTime<Local>) -> AuditEntry {
        AuditEntry {
            timestamp,
            subject_id: self.subject_id,
            subject_name: self.subject_name,
            previous_settings: self.previous_settings,
            new_settings: self.new_settings,
            trigger: self.trigger,
            profile_name: self.profile_name,
        }
    }
}

#[derive(Default)]
struct AuditState {
    /// Lazily loaded from the store on first access
    entries: Option<Vec<AuditEntry>>,
    retention_days: Option<u32>,
}

impl AuditState {
    fn entries(&mut self, store: &dyn KeyValueStore) -> &mut Vec<AuditEntry> {
        self.entries.get_or_insert_with(|| load_entries(store))
    }

    fn retention_days(&mut self, store: &dyn KeyValueStore) -> u32 {
        *self
            .retention_days
            .get_or_insert_with(|| load_retention_days(store))
    }
}

/// Append-only, bounded record of policy transitions
pub struct AuditLog {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<AuditState>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            state: Mutex::new(AuditState::default()),
        }
    }

    /// Stamp and record a transition, then enforce both bounds and persist
    pub fn log(&self, transition: Transition) -> AuditEntry {
        let now = self.clock.now();
        let entry = transition.stamp(now);

        let mut state = self.state.lock().unwrap();
        let retention_days = state.retention_days(&*self.store);
        let entries = state.entries(&*self.store);

        entries.insert(0, entry.clone());
        entries.truncate(MAX_ENTRIES);
        prune_older_than(entries, cutoff(now, retention_days));
        self.persist(entries);

        debug!(
            trigger = %entry.trigger,
            subject = entry.subject_label(),
            "Audit entry recorded"
        );
        entry
    }

    pub fn log_manual(
        &self,
        subject_id: &SubjectId,
        subject_name: &str,
        previous: Option<PolicySettings>,
        new: PolicySettings,
    ) -> AuditEntry {
        self.log(
            Transition::new(Trigger::Manual, new)
                .for_subject(subject_id.clone(), subject_name)
                .with_previous(previous),
        )
    }

    pub fn log_schedule(
        &self,
        subject_id: &SubjectId,
        subject_name: &str,
        previous: Option<PolicySettings>,
        new: PolicySettings,
    ) -> AuditEntry {
        self.log(
            Transition::new(Trigger::Schedule, new)
                .for_subject(subject_id.clone(), subject_name)
                .with_previous(previous),
        )
    }

    pub fn log_profile(
        &self,
        subject_id: &SubjectId,
        subject_name: &str,
        previous: Option<PolicySettings>,
        new: PolicySettings,
        profile_name: &str,
    ) -> AuditEntry {
        self.log(
            Transition::new(Trigger::Profile, new)
                .for_subject(subject_id.clone(), subject_name)
                .with_previous(previous)
                .with_profile(profile_name),
        )
    }

    /// Record the global override flipping on or off
    pub fn log_panic(&self, active: bool) -> AuditEntry {
        let settings = if active {
            PolicySettings::ALL_BLOCKED
        } else {
            PolicySettings::ALL_ALLOWED
        };
        self.log(Transition::new(Trigger::Panic, settings))
    }

    /// All entries, newest first
    pub fn get_logs(&self) -> Vec<AuditEntry> {
        let mut state = self.state.lock().unwrap();
        state.entries(&*self.store).clone()
    }

    pub fn get_logs_for_subject(&self, subject_id: &SubjectId) -> Vec<AuditEntry> {
        let mut state = self.state.lock().unwrap();
        state
            .entries(&*self.store)
            .iter()
            .filter(|e| e.subject_id.as_ref() == Some(subject_id))
            .cloned()
            .collect()
    }

    /// Entries with `start <= timestamp <= end`
    pub fn get_logs_in_range(&self, start: DateTime<Local>, end: DateTime<Local>) -> Vec<AuditEntry> {
        let mut state = self.state.lock().unwrap();
        state
            .entries(&*self.store)
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn get_recent_logs(&self, limit: usize) -> Vec<AuditEntry> {
        let mut state = self.state.lock().unwrap();
        state
            .entries(&*self.store)
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear_logs(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries = Some(Vec::new());

        if let Err(e) = self.store.remove(keys::AUDIT_LOG) {
            warn!(error = %e, "Failed to clear persisted audit log");
        }
        info!("Audit log cleared");
    }

    /// One line per entry, newest first
    pub fn export_logs(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state
            .entries(&*self.store)
            .iter()
            .map(AuditEntry::export_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn export_logs_json(&self) -> StoreResult<String> {
        let mut state = self.state.lock().unwrap();
        Ok(serde_json::to_string_pretty(state.entries(&*self.store))?)
    }

    /// Drop entries older than the retention window. Returns how many were removed.
    pub fn apply_retention(&self) -> usize {
        let now = self.clock.now();

        let mut state = self.state.lock().unwrap();
        let retention_days = state.retention_days(&*self.store);
        let entries = state.entries(&*self.store);

        let before = entries.len();
        prune_older_than(entries, cutoff(now, retention_days));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(entries);
            info!(removed, retention_days, "Pruned expired audit entries");
        }
        removed
    }

    pub fn retention_days(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.retention_days(&*self.store)
    }

    /// Change and persist the retention window, then prune against it.
    /// Returns how many entries were removed.
    pub fn set_retention_days(&self, days: u32) -> usize {
        {
            let mut state = self.state.lock().unwrap();
            state.retention_days = Some(days);
        }

        if let Err(e) = self
            .store
            .set(keys::AUDIT_RETENTION_DAYS, &days.to_string())
        {
            warn!(error = %e, days, "Failed to persist audit retention");
        }

        self.apply_retention()
    }

    fn persist(&self, entries: &[AuditEntry]) {
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit log");
                return;
            }
        };

        if let Err(e) = self.store.set(keys::AUDIT_LOG, &json) {
            warn!(error = %e, entries = entries.len(), "Failed to persist audit log");
        }
    }
}

fn cutoff(now: DateTime<Local>, retention_days: u32) -> DateTime<Local> {
    now - chrono::Duration::days(i64::from(retention_days))
}

fn prune_older_than(entries: &mut Vec<AuditEntry>, cutoff: DateTime<Local>) {
    entries.retain(|e| e.timestamp >= cutoff);
}

fn load_entries(store: &dyn KeyValueStore) -> Vec<AuditEntry> {
    let json = match store.get(keys::AUDIT_LOG) {
        Ok(Some(json)) => json,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read audit log; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<AuditEntry>>(&json) {
        Ok(mut entries) => {
            entries.truncate(MAX_ENTRIES);
            debug!(count = entries.len(), "Audit log loaded");
            entries
        }
        Err(e) => {
            warn!(error = %e, "Stored audit log is malformed; starting empty");
            Vec::new()
        }
    }
}

fn load_retention_days(store: &dyn KeyValueStore) -> u32 {
    match store.get(keys::AUDIT_RETENTION_DAYS) {
        Ok(Some(value)) => value.trim().parse().unwrap_or_else(|_| {
            warn!(value = %value, "Stored audit retention is malformed; using default");
            DEFAULT_RETENTION_DAYS
        }),
        Ok(None) => DEFAULT_RETENTION_DAYS,
        Err(e) => {
            warn!(error = %e, "Failed to read audit retention; using default");
            DEFAULT_RETENTION_DAYS
        }
    }
}
