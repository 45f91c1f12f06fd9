//! Configuration validation

use crate::schema::{RawConfig, RawPlan, RawScheduling};
use std::collections::HashSet;
use thiserror::Error;

/// Hard ceiling for `scheduling.max_weeks`
pub const MAX_WEEKS_LIMIT: u32 = 52;

/// Longest training a duration button may offer
const MAX_DURATION_MINUTES: u32 = 12 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Plan '{plan_id}': {message}")]
    PlanError { plan_id: String, message: String },

    #[error("Duplicate plan ID: {0}")]
    DuplicatePlanId(String),

    #[error("Duplicate plan label: {0}")]
    DuplicatePlanLabel(String),

    #[error("Scheduling config error: {0}")]
    SchedulingError(String),

    #[error("Service config error: {0}")]
    ServiceError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.session_ttl_seconds == Some(0) {
        errors.push(ValidationError::ServiceError(
            "session_ttl_seconds must be positive".into(),
        ));
    }

    errors.extend(validate_scheduling(&config.scheduling));

    // Plans are picked by their button label, so both keys must be unique
    let mut seen_ids = HashSet::new();
    let mut seen_labels = HashSet::new();
    for plan in &config.plans {
        if !seen_ids.insert(&plan.id) {
            errors.push(ValidationError::DuplicatePlanId(plan.id.clone()));
        }
        if !seen_labels.insert(&plan.label) {
            errors.push(ValidationError::DuplicatePlanLabel(plan.label.clone()));
        }
        errors.extend(validate_plan(plan));
    }

    errors
}

fn validate_scheduling(scheduling: &RawScheduling) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let max_weeks = scheduling.max_weeks.unwrap_or(crate::DEFAULT_MAX_WEEKS);
    if max_weeks == 0 || max_weeks > MAX_WEEKS_LIMIT {
        errors.push(ValidationError::SchedulingError(format!(
            "max_weeks must be between 1 and {}, got {}",
            MAX_WEEKS_LIMIT, max_weeks
        )));
    }

    if let Some(options) = &scheduling.week_options {
        if options.is_empty() {
            errors.push(ValidationError::SchedulingError(
                "week_options cannot be empty".into(),
            ));
        }
        for &weeks in options {
            if weeks == 0 || weeks > max_weeks {
                errors.push(ValidationError::SchedulingError(format!(
                    "week option {} is outside 1..={}",
                    weeks, max_weeks
                )));
            }
        }
    }

    if let Some(durations) = &scheduling.duration_minutes {
        if durations.is_empty() {
            errors.push(ValidationError::SchedulingError(
                "duration_minutes cannot be empty".into(),
            ));
        }
        for &minutes in durations {
            if minutes == 0 || minutes > MAX_DURATION_MINUTES {
                errors.push(ValidationError::SchedulingError(format!(
                    "duration {} minutes is outside 1..={}",
                    minutes, MAX_DURATION_MINUTES
                )));
            }
        }
    }

    if scheduling.calendar_days == Some(0) {
        errors.push(ValidationError::SchedulingError(
            "calendar_days must be positive".into(),
        ));
    }

    errors
}

fn validate_plan(plan: &RawPlan) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let error = |message: &str| ValidationError::PlanError {
        plan_id: plan.id.clone(),
        message: message.into(),
    };

    if plan.id.trim().is_empty() {
        errors.push(error("id cannot be empty"));
    }
    if plan.label.trim().is_empty() {
        errors.push(error("label cannot be empty"));
    }
    if plan.lessons == 0 {
        errors.push(error("lessons must be positive"));
    }
    if plan.valid_days == Some(0) {
        errors.push(error("valid_days must be positive when set"));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, label: &str, lessons: u32) -> RawPlan {
        RawPlan {
            id: id.into(),
            label: label.into(),
            lessons,
            valid_days: Some(30),
        }
    }

    fn config(plans: Vec<RawPlan>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            scheduling: Default::default(),
            registration: Default::default(),
            plans,
        }
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        let config = config(vec![plan("trial", "Пробное", 1), plan("month", "16", 16)]);
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_duplicate_plan_detection() {
        let config = config(vec![plan("trial", "Пробное", 1), plan("trial", "Пробное", 2)]);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicatePlanId(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicatePlanLabel(_))));
    }

    #[test]
    fn test_plan_fields() {
        let mut bad = plan("", "", 0);
        bad.valid_days = Some(0);

        let errors = validate_config(&config(vec![bad]));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_scheduling_bounds() {
        let mut config = config(vec![]);
        config.scheduling.max_weeks = Some(4);
        config.scheduling.week_options = Some(vec![1, 8]);
        config.scheduling.duration_minutes = Some(vec![]);
        config.scheduling.calendar_days = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::SchedulingError(_))));

        config.scheduling = Default::default();
        config.scheduling.max_weeks = Some(MAX_WEEKS_LIMIT + 1);
        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn test_zero_session_ttl_rejected() {
        let mut config = config(vec![]);
        config.service.session_ttl_seconds = Some(0);
        assert!(matches!(
            validate_config(&config).as_slice(),
            [ValidationError::ServiceError(_)]
        ));
    }
}
