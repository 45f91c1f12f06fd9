//! Club domain types shared by the store, the core, and IPC clients

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use spectrum_util::{
    AttendanceId, CoachId, GroupId, StudentId, SubscriptionId, TelegramId, TemplateId, TrainingId,
    UserId,
};

/// Role a messenger user registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Coach,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Coach => "coach",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Role::Student),
            "coach" => Some(Role::Coach),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub telegram_id: TelegramId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub role: Role,
    pub registered_at: DateTime<Local>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Profile fields sent along with every chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub telegram_id: TelegramId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub user_id: UserId,
    /// Display name, joined from the user record
    pub name: String,
    pub athletic_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coach {
    pub id: CoachId,
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub code: Option<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub code: Option<String>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub description: Option<String>,
}

/// A dated occurrence of a class for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Training {
    pub id: TrainingId,
    pub group_id: GroupId,
    pub coach_id: Option<CoachId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Free text, usually the place
    pub description: String,
    /// `None` means unlimited
    pub max_participants: Option<u32>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl Training {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn has_started(&self, now: &DateTime<Local>) -> bool {
        self.starts_at() <= now.naive_local()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTraining {
    pub group_id: GroupId,
    pub coach_id: Option<CoachId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub description: String,
    pub max_participants: Option<u32>,
    pub created_by: Option<UserId>,
}

impl NewTraining {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// Training with the display name of its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingView {
    #[serde(flatten)]
    pub training: Training,
    pub group_name: String,
}

/// Weekly recurring schedule entry, expanded into trainings on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekTemplate {
    pub id: TemplateId,
    pub group_id: GroupId,
    /// 1 = Monday .. 7 = Sunday
    pub day_of_week: u8,
    /// Raw time of day as authored, e.g. `15:30:00`
    pub start_time: String,
    pub end_time: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub group_id: GroupId,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Registered,
    Cancelled,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Registered => "registered",
            AttendanceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registered" => Some(AttendanceStatus::Registered),
            "cancelled" => Some(AttendanceStatus::Cancelled),
            _ => None,
        }
    }
}

/// A student's booking of a training, with the attendance mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub training_id: TrainingId,
    pub student_id: StudentId,
    pub status: AttendanceStatus,
    pub attended: bool,
    pub notes: Option<String>,
    pub recorded_by: Option<CoachId>,
    pub recorded_at: Option<DateTime<Local>>,
    pub created_at: DateTime<Local>,
}

/// A registration joined with its training, for a student's own schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub attendance: Attendance,
    pub training: TrainingView,
}

/// A registered student as listed on a training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub attendance_id: AttendanceId,
    pub student_id: StudentId,
    pub name: String,
    pub attended: bool,
    pub registered_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    pub registered: u32,
    pub present: u32,
    pub absent: u32,
}

/// Prepaid lesson package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub student_id: StudentId,
    pub total_lessons: u32,
    pub remaining_lessons: u32,
    pub start_date: DateTime<Local>,
    pub end_date: Option<DateTime<Local>>,
    pub created_at: DateTime<Local>,
}

impl Subscription {
    /// Lessons left and not expired
    pub fn is_active(&self, now: &DateTime<Local>) -> bool {
        self.remaining_lessons > 0 && self.end_date.is_none_or(|end| end > *now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub student_id: StudentId,
    pub total_lessons: u32,
    pub start_date: DateTime<Local>,
    pub end_date: Option<DateTime<Local>>,
}

/// Subscription kind a coach can issue from the chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    /// Button label shown to the coach
    pub label: String,
    pub lessons: u32,
    /// `None` means the lessons never expire
    pub valid_days: Option<u32>,
}

impl SubscriptionPlan {
    pub fn issue_for(&self, student_id: StudentId, now: DateTime<Local>) -> NewSubscription {
        NewSubscription {
            student_id,
            total_lessons: self.lessons,
            start_date: now,
            end_date: self
                .valid_days
                .and_then(|days| now.checked_add_days(Days::new(u64::from(days)))),
        }
    }
}

/// Result of the lesson debit attached to an attendance mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DebitOutcome {
    /// The student was already marked present, or is being marked absent
    NotRequired,
    Debited {
        subscription_id: SubscriptionId,
        remaining_lessons: u32,
    },
    /// Attendance was still recorded
    Failed { reason: String },
}

/// Per-student result of marking attendance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceMark {
    pub student_id: StudentId,
    pub name: String,
    pub result: MarkResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarkResult {
    Marked { debit: DebitOutcome },
    Rejected { reason: String },
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub active_sessions: usize,
}
