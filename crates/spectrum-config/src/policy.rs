//! Validated club configuration

use crate::schema::{RawConfig, RawPlan, RawRegistration, RawScheduling, RawServiceConfig};
use spectrum_api::SubscriptionPlan;
use spectrum_util::{TelegramId, data_dir_without_env, socket_path_without_env};
use std::path::PathBuf;
use std::time::Duration;

/// Default upper bound for the template weeks count
pub const DEFAULT_MAX_WEEKS: u32 = 12;

const DEFAULT_WEEK_OPTIONS: [u32; 4] = [1, 2, 4, 8];
const DEFAULT_DURATIONS: [u32; 4] = [45, 60, 90, 120];
const DEFAULT_CALENDAR_DAYS: u32 = 30;
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Validated configuration ready for use by the core and the service
#[derive(Debug, Clone)]
pub struct ClubConfig {
    pub service: ServiceConfig,
    pub scheduling: SchedulingPolicy,
    pub registration: RegistrationPolicy,
    /// Issuable subscription kinds, in button order
    pub plans: Vec<SubscriptionPlan>,
}

impl ClubConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let plans = if raw.plans.is_empty() {
            default_plans()
        } else {
            raw.plans.into_iter().map(convert_plan).collect()
        };

        Self {
            service: ServiceConfig::from_raw(raw.service),
            scheduling: SchedulingPolicy::from_raw(raw.scheduling),
            registration: RegistrationPolicy::from_raw(raw.registration),
            plans,
        }
    }

    /// Plan whose button label matches the input exactly
    pub fn plan_by_label(&self, label: &str) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|p| p.label == label)
    }
}

impl Default for ClubConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            scheduling: SchedulingPolicy::default(),
            registration: RegistrationPolicy::default(),
            plans: default_plans(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub session_ttl: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(socket_path_without_env),
            data_dir: raw.data_dir.unwrap_or_else(data_dir_without_env),
            session_ttl: raw
                .session_ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SESSION_TTL),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Options offered by the scheduling flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingPolicy {
    pub max_weeks: u32,
    pub week_options: Vec<u32>,
    pub duration_minutes: Vec<u32>,
    pub calendar_days: u32,
}

impl SchedulingPolicy {
    fn from_raw(raw: RawScheduling) -> Self {
        Self {
            max_weeks: raw.max_weeks.unwrap_or(DEFAULT_MAX_WEEKS),
            week_options: raw
                .week_options
                .unwrap_or_else(|| DEFAULT_WEEK_OPTIONS.to_vec()),
            duration_minutes: raw
                .duration_minutes
                .unwrap_or_else(|| DEFAULT_DURATIONS.to_vec()),
            calendar_days: raw.calendar_days.unwrap_or(DEFAULT_CALENDAR_DAYS),
        }
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::from_raw(RawScheduling::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationPolicy {
    /// Empty means coach registration is open
    pub coach_telegram_ids: Vec<TelegramId>,
}

impl RegistrationPolicy {
    fn from_raw(raw: RawRegistration) -> Self {
        Self {
            coach_telegram_ids: raw
                .coach_telegram_ids
                .into_iter()
                .map(TelegramId::new)
                .collect(),
        }
    }

    pub fn allows_coach(&self, telegram_id: TelegramId) -> bool {
        self.coach_telegram_ids.is_empty() || self.coach_telegram_ids.contains(&telegram_id)
    }
}

fn convert_plan(raw: RawPlan) -> SubscriptionPlan {
    SubscriptionPlan {
        id: raw.id,
        label: raw.label,
        lessons: raw.lessons,
        valid_days: raw.valid_days,
    }
}

/// The three packages the club sells
pub fn default_plans() -> Vec<SubscriptionPlan> {
    vec![
        SubscriptionPlan {
            id: "trial".into(),
            label: "⛰️Пробное занятие".into(),
            lessons: 1,
            valid_days: Some(30),
        },
        SubscriptionPlan {
            id: "twelve-unlimited".into(),
            label: "💪 Абонемент на 12 занятий\n(Несгораемый)".into(),
            lessons: 12,
            valid_days: None,
        },
        SubscriptionPlan {
            id: "sixteen-monthly".into(),
            label: "⛏️ Абонемент на 16 занятий\n(30дней)".into(),
            lessons: 16,
            valid_days: Some(30),
        },
    ]
}
