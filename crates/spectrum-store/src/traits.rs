//! Store trait definitions
//!
//! Every method is one atomic unit of work. Operations whose correctness
//! depends on a check-then-write (sign-up capacity, attendance transitions,
//! lesson debits, slot uniqueness) are single methods so an implementation
//! can run them inside one transaction.

use chrono::{DateTime, Local, NaiveDate};
use spectrum_api::{
    Attendance, Booking, Coach, Group, NewGroup, NewSubscription, NewTemplate, NewTraining,
    NewUser, Participant, Role, Student, Subscription, Training, TrainingStats, TrainingUpdate,
    User, WeekTemplate, TemplateUpdate,
};
use spectrum_util::{
    CoachId, GroupId, StudentId, SubscriptionId, TelegramId, TemplateId, TrainingId, UserId,
};

use crate::{AuditEvent, StoreResult};

/// Outcome of a conditional sign-up insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(Attendance),
    AlreadyRegistered,
    Full { capacity: u32 },
    TrainingMissing,
}

/// Attendance mark written by a coach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceMarkInput {
    pub attended: bool,
    pub notes: Option<String>,
    pub recorded_by: Option<CoachId>,
    pub recorded_at: DateTime<Local>,
}

pub trait TrainingStore: Send + Sync {
    /// Insert a training; a taken (group, date, start) slot is a `Conflict`
    fn create_training(&self, training: &NewTraining) -> StoreResult<Training>;

    /// Insert a training unless its (group, date, start) slot is taken.
    /// Returns `None` when the slot already existed.
    fn insert_training_if_absent(&self, training: &NewTraining) -> StoreResult<Option<Training>>;

    fn get_training(&self, id: TrainingId) -> StoreResult<Option<Training>>;

    /// Trainings dated within `from..=to`, ordered by start
    fn list_trainings(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<Training>>;

    fn list_group_trainings(
        &self,
        group_id: GroupId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Training>>;

    fn list_coach_trainings(
        &self,
        coach_id: CoachId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Training>>;

    /// Apply a partial update. `NotFound` if the training is gone,
    /// `Conflict` if the new slot is taken.
    fn update_training(&self, id: TrainingId, update: &TrainingUpdate) -> StoreResult<Training>;

    /// Delete a training together with its attendance rows
    fn delete_training(&self, id: TrainingId) -> StoreResult<bool>;
}

pub trait TemplateStore: Send + Sync {
    fn create_template(&self, template: &NewTemplate) -> StoreResult<WeekTemplate>;

    fn get_template(&self, id: TemplateId) -> StoreResult<Option<WeekTemplate>>;

    fn list_active_templates(&self) -> StoreResult<Vec<WeekTemplate>>;

    fn list_group_templates(&self, group_id: GroupId) -> StoreResult<Vec<WeekTemplate>>;

    fn update_template(&self, id: TemplateId, update: &TemplateUpdate)
    -> StoreResult<WeekTemplate>;

    fn delete_template(&self, id: TemplateId) -> StoreResult<bool>;
}

pub trait AttendanceStore: Send + Sync {
    /// Check capacity and existing registration, then insert, in one transaction
    fn register_attendance(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<Registration>;

    /// Mark the registration cancelled. Returns `false` if there was none.
    fn cancel_registration(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<bool>;

    fn get_registration(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
    ) -> StoreResult<Option<Attendance>>;

    /// Write the attendance mark and return the previous `attended` value.
    /// Returns `None` if the student is not registered.
    fn set_attended(
        &self,
        training_id: TrainingId,
        student_id: StudentId,
        mark: &AttendanceMarkInput,
    ) -> StoreResult<Option<bool>>;

    fn count_registered(&self, training_id: TrainingId) -> StoreResult<u32>;

    fn list_participants(&self, training_id: TrainingId) -> StoreResult<Vec<Participant>>;

    fn training_stats(&self, training_id: TrainingId) -> StoreResult<TrainingStats>;

    /// Registered bookings of a student for trainings dated within `from..=to`
    fn list_student_bookings(
        &self,
        student_id: StudentId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Booking>>;
}

pub trait SubscriptionStore: Send + Sync {
    fn create_subscription(&self, subscription: &NewSubscription) -> StoreResult<Subscription>;

    fn get_subscription(&self, id: SubscriptionId) -> StoreResult<Option<Subscription>>;

    /// Newest first
    fn list_student_subscriptions(&self, student_id: StudentId) -> StoreResult<Vec<Subscription>>;

    /// Every subscription in the club, grouped by student, newest first within a student
    fn list_all_subscriptions(&self) -> StoreResult<Vec<Subscription>>;

    /// Most recently created subscription that is active at `now`
    fn active_subscription(
        &self,
        student_id: StudentId,
        now: DateTime<Local>,
    ) -> StoreResult<Option<Subscription>>;

    /// Take one lesson from the active subscription in a single conditional
    /// update. Returns the updated subscription, or `None` if none was active.
    fn debit_lesson(
        &self,
        student_id: StudentId,
        now: DateTime<Local>,
    ) -> StoreResult<Option<Subscription>>;

    fn delete_subscription(&self, id: SubscriptionId) -> StoreResult<bool>;
}

/// Reference data owned outside the booking engine
pub trait DirectoryStore: Send + Sync {
    /// Create or refresh a user by messenger id, setting the role
    fn upsert_user(&self, user: &NewUser, role: Role) -> StoreResult<User>;

    fn user_by_telegram_id(&self, telegram_id: TelegramId) -> StoreResult<Option<User>>;

    /// Get or create the student profile of a user
    fn ensure_student(&self, user_id: UserId) -> StoreResult<Student>;

    /// Get or create the coach profile of a user
    fn ensure_coach(&self, user_id: UserId) -> StoreResult<Coach>;

    fn student_for_user(&self, user_id: UserId) -> StoreResult<Option<Student>>;

    fn coach_for_user(&self, user_id: UserId) -> StoreResult<Option<Coach>>;

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>>;

    fn list_students(&self) -> StoreResult<Vec<Student>>;

    fn create_group(&self, group: &NewGroup) -> StoreResult<Group>;

    fn get_group(&self, id: GroupId) -> StoreResult<Option<Group>>;

    fn list_groups(&self) -> StoreResult<Vec<Group>>;
}

pub trait AuditLog: Send + Sync {
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;
}

/// Everything the engine needs from persistence
pub trait Store:
    TrainingStore + TemplateStore + AttendanceStore + SubscriptionStore + DirectoryStore + AuditLog
{
    fn is_healthy(&self) -> bool;
}
