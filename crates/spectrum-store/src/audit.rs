//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use spectrum_util::{
    CoachId, GroupId, StudentId, SubscriptionId, TelegramId, TemplateId, TrainingId, UserId,
};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    ConfigLoaded { plan_count: usize },

    UserRegistered {
        user_id: UserId,
        telegram_id: TelegramId,
        role: String,
    },

    TrainingCreated {
        training_id: TrainingId,
        group_id: GroupId,
        coach_id: Option<CoachId>,
    },

    TrainingUpdated { training_id: TrainingId },

    TrainingDeleted { training_id: TrainingId },

    /// A batch expansion of week templates
    ScheduleGenerated {
        first_day: NaiveDate,
        weeks: u32,
        created: u32,
        skipped_existing: u32,
        skipped_invalid: u32,
    },

    TemplateSkipped {
        template_id: TemplateId,
        reason: String,
    },

    SignedUp {
        training_id: TrainingId,
        student_id: StudentId,
    },

    SignUpCancelled {
        training_id: TrainingId,
        student_id: StudentId,
    },

    AttendanceMarked {
        training_id: TrainingId,
        student_id: StudentId,
        attended: bool,
        recorded_by: Option<CoachId>,
    },

    LessonDebited {
        student_id: StudentId,
        subscription_id: SubscriptionId,
        remaining_lessons: u32,
    },

    /// Attendance was recorded but no lesson could be taken
    DebitFailed {
        student_id: StudentId,
        training_id: TrainingId,
        reason: String,
    },

    SubscriptionIssued {
        subscription_id: SubscriptionId,
        student_id: StudentId,
        lessons: u32,
    },

    SubscriptionDeleted { subscription_id: SubscriptionId },

    ClientConnected {
        client_id: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Set by the store
    pub id: i64,

    pub timestamp: DateTime<Local>,

    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: spectrum_util::now(),
            event,
        }
    }
}
