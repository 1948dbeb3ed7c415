//! Configuration validation

use crate::schema::{RawConfig, RawFlag, RawProfile, RawSchedule, RawSettings, RawSubject, RawWebhook};
use std::collections::HashSet;
use thiserror::Error;
use warden_api::{EventKind, RecordingBlockStrategy, ScheduleKind};
use warden_util::WallClock;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Subject '{subject_id}': {message}")]
    SubjectError { subject_id: String, message: String },

    #[error("Profile '{profile_id}': {message}")]
    ProfileError { profile_id: String, message: String },

    #[error("Duplicate subject ID: {0}")]
    DuplicateSubjectId(String),

    #[error("Duplicate profile ID: {0}")]
    DuplicateProfileId(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid boolean for {field}: '{value}'")]
    InvalidFlag { field: String, value: String },

    #[error("More than one profile is marked active: {0:?}")]
    MultipleActiveProfiles(Vec<String>),

    #[error("Webhook: {0}")]
    WebhookError(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.check_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "check_interval_seconds must be greater than 0".into(),
        ));
    }

    let mut seen_subjects = HashSet::new();
    for subject in &config.subjects {
        if !seen_subjects.insert(subject.id.as_str()) {
            errors.push(ValidationError::DuplicateSubjectId(subject.id.clone()));
        }
        errors.extend(validate_subject(subject));
    }

    let mut seen_profiles = HashSet::new();
    for profile in &config.profiles {
        if !seen_profiles.insert(profile.id.as_str()) {
            errors.push(ValidationError::DuplicateProfileId(profile.id.clone()));
        }
        errors.extend(validate_profile(profile, &seen_subjects));
    }

    let active: Vec<String> = config
        .profiles
        .iter()
        .filter(|p| matches!(p.active.as_ref().map(parse_flag), Some(Ok(true))))
        .map(|p| p.id.clone())
        .collect();
    if active.len() > 1 {
        errors.push(ValidationError::MultipleActiveProfiles(active));
    }

    if let Some(webhook) = &config.webhook {
        errors.extend(validate_webhook(webhook));
    }

    errors
}

fn validate_subject(subject: &RawSubject) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let field = |name: &str| format!("subject '{}' {}", subject.id, name);

    if subject.id.trim().is_empty() {
        errors.push(ValidationError::GlobalError("subject id cannot be empty".into()));
    }

    if let Some(flag) = &subject.enabled {
        errors.extend(check_flag(flag, &field("enabled")));
    }

    if let Some(strategy) = &subject.recording_block {
        if let Err(message) = parse_recording_block(strategy) {
            errors.push(ValidationError::SubjectError {
                subject_id: subject.id.clone(),
                message,
            });
        }
    }

    if let Some(manual) = &subject.manual {
        errors.extend(check_settings(manual, &field("manual")));
    }

    if let Some(schedule) = &subject.schedule {
        errors.extend(validate_schedule(schedule, &subject.id));
    }

    errors
}

fn validate_schedule(schedule: &RawSchedule, subject_id: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let subject_error = |message: String| ValidationError::SubjectError {
        subject_id: subject_id.to_string(),
        message,
    };

    if let Some(flag) = &schedule.enabled {
        errors.extend(check_flag(flag, &format!("subject '{}' schedule.enabled", subject_id)));
    }

    for value in [&schedule.start, &schedule.end] {
        if let Err(e) = WallClock::parse(value) {
            errors.push(ValidationError::InvalidTimeFormat {
                value: value.clone(),
                message: e.reason.to_string(),
            });
        }
    }

    match parse_schedule_kind(&schedule.kind) {
        Ok(ScheduleKind::Custom) => {
            if schedule.days.is_empty() {
                errors.push(subject_error("custom schedule needs at least one day".into()));
            }
            for day in &schedule.days {
                if !(0..=6).contains(day) {
                    errors.push(subject_error(format!(
                        "day {} is out of range (0 = Sunday .. 6 = Saturday)",
                        day
                    )));
                }
            }
        }
        Ok(_) => {}
        Err(message) => errors.push(subject_error(message)),
    }

    errors.extend(check_settings(
        &schedule.settings,
        &format!("subject '{}' schedule.settings", subject_id),
    ));

    errors
}

fn validate_profile(profile: &RawProfile, subjects: &HashSet<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if profile.name.trim().is_empty() {
        errors.push(ValidationError::ProfileError {
            profile_id: profile.id.clone(),
            message: "name cannot be empty".into(),
        });
    }

    for member in &profile.members {
        if !subjects.contains(member.as_str()) {
            errors.push(ValidationError::ProfileError {
                profile_id: profile.id.clone(),
                message: format!("unknown member subject '{}'", member),
            });
        }
    }

    if let Some(flag) = &profile.active {
        errors.extend(check_flag(flag, &format!("profile '{}' active", profile.id)));
    }

    errors.extend(check_settings(
        &profile.settings,
        &format!("profile '{}' settings", profile.id),
    ));

    errors
}

fn validate_webhook(webhook: &RawWebhook) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let url = webhook.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::WebhookError(format!(
            "url must start with http:// or https://, got '{}'",
            webhook.url
        )));
    }

    for event in webhook.events.iter().flatten() {
        if let Err(e) = event.parse::<EventKind>() {
            errors.push(ValidationError::WebhookError(e.to_string()));
        }
    }

    if let Some(flag) = &webhook.include_camera_details {
        errors.extend(check_flag(flag, "webhook include_camera_details"));
    }

    if webhook.timeout_seconds == Some(0) {
        errors.push(ValidationError::WebhookError(
            "timeout_seconds must be greater than 0".into(),
        ));
    }

    errors
}

fn check_flag(flag: &RawFlag, field: &str) -> Option<ValidationError> {
    parse_flag(flag).err().map(|value| ValidationError::InvalidFlag {
        field: field.to_string(),
        value,
    })
}

fn check_settings(settings: &RawSettings, field: &str) -> Vec<ValidationError> {
    [
        ("block_recording", &settings.block_recording),
        ("block_events", &settings.block_events),
        ("block_streaming", &settings.block_streaming),
        ("block_detection", &settings.block_detection),
        ("block_motion_alerts", &settings.block_motion_alerts),
    ]
    .into_iter()
    .filter_map(|(name, flag)| {
        flag.as_ref()
            .and_then(|f| check_flag(f, &format!("{}.{}", field, name)))
    })
    .collect()
}

/// Parse a loosely-typed flag into a strict bool.
///
/// Returns the offending text when a string is not a recognised truthy/falsy word.
pub fn parse_flag(flag: &RawFlag) -> Result<bool, String> {
    match flag {
        RawFlag::Bool(b) => Ok(*b),
        RawFlag::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(text.clone()),
        },
    }
}

/// Parse a schedule type name
pub fn parse_schedule_kind(s: &str) -> Result<ScheduleKind, String> {
    match s.trim().to_lowercase().as_str() {
        "daily" => Ok(ScheduleKind::Daily),
        "weekdays" => Ok(ScheduleKind::Weekdays),
        "weekends" => Ok(ScheduleKind::Weekends),
        "custom" => Ok(ScheduleKind::Custom),
        other => Err(format!("unknown schedule type: {}", other)),
    }
}

/// Parse a recording-block strategy name
pub fn parse_recording_block(s: &str) -> Result<RecordingBlockStrategy, String> {
    match s.trim().to_lowercase().as_str() {
        "indicator_flag" => Ok(RecordingBlockStrategy::IndicatorFlag),
        "privacy_mode" => Ok(RecordingBlockStrategy::PrivacyMode),
        other => Err(format!("unknown recording_block strategy: {}", other)),
    }
}
