//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Chat scheduling options
    #[serde(default)]
    pub scheduling: RawScheduling,

    /// Who may register as a coach
    #[serde(default)]
    pub registration: RawRegistration,

    /// Subscription kinds a coach can issue. Empty means the built-in set.
    #[serde(default)]
    pub plans: Vec<RawPlan>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/spectrumd/spectrumd.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the SQLite store
    pub data_dir: Option<PathBuf>,

    /// Idle time after which an unfinished chat flow is dropped
    pub session_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScheduling {
    /// Upper bound for the weeks count typed in the template flow
    pub max_weeks: Option<u32>,

    /// Weeks count buttons offered in the template flow
    pub week_options: Option<Vec<u32>>,

    /// Duration buttons offered when adding a training, in minutes
    pub duration_minutes: Option<Vec<u32>>,

    /// How far ahead bookings are listed for students
    pub calendar_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRegistration {
    /// Telegram ids allowed to run `/coach`. Empty means anyone.
    #[serde(default)]
    pub coach_telegram_ids: Vec<i64>,
}

/// Subscription plan
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPlan {
    /// Stable identifier used in logs
    pub id: String,

    /// Button label shown to the coach
    pub label: String,

    /// Lessons in the package
    pub lessons: u32,

    /// Days until expiry; omitted for packages that never expire
    pub valid_days: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            data_dir = "/var/lib/spectrum"
            session_ttl_seconds = 900

            [scheduling]
            max_weeks = 8
            week_options = [1, 2, 4]
            duration_minutes = [60, 90]

            [registration]
            coach_telegram_ids = [1001, 1002]

            [[plans]]
            id = "trial"
            label = "Пробное занятие"
            lessons = 1
            valid_days = 30

            [[plans]]
            id = "twelve"
            label = "12 занятий"
            lessons = 12
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.session_ttl_seconds, Some(900));
        assert_eq!(config.scheduling.week_options, Some(vec![1, 2, 4]));
        assert_eq!(config.registration.coach_telegram_ids, vec![1001, 1002]);
        assert_eq!(config.plans.len(), 2);
        assert_eq!(config.plans[1].valid_days, None);
    }

    #[test]
    fn parse_minimal_config() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.plans.is_empty());
        assert!(config.scheduling.max_weeks.is_none());
    }
}
