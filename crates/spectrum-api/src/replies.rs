//! What the conversation hands back to the chat transport
//!
//! Replies are structured: the transport owns wording and keyboards, the
//! service owns state. Every prompt carries the data the transport needs to
//! render it, so a re-prompt after bad input is the same value again.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use spectrum_util::{SubscriptionId, TrainingId};

use crate::{
    AttendanceMark, Booking, Group, Participant, Role, Student, Subscription, SubscriptionPlan,
    TrainingView,
};

/// Button labels shared by the conversation and the chat transport
pub mod labels {
    pub const CANCEL: &str = "❌ Отмена";
    pub const DECLINE: &str = "❌ Нет, отменить";
    pub const BACK: &str = "◀️ Назад";

    pub const TODAY: &str = "Сегодня";
    pub const TOMORROW: &str = "Завтра";
    pub const DAY_AFTER_TOMORROW: &str = "Послезавтра";
    pub const IN_A_WEEK: &str = "Через неделю";

    pub const THIS_WEEK: &str = "Эта неделя";
    pub const NEXT_WEEK: &str = "Следующая неделя";
    pub const TWO_WEEKS_AHEAD: &str = "2 недели вперед";
    pub const WHOLE_MONTH: &str = "Весь месяц";

    pub const CONFIRM: &str = "✅ Подтвердить";
    pub const CONFIRM_CREATE_TRAINING: &str = "✅ Создать тренировку";
    pub const CONFIRM_CREATE_SCHEDULE: &str = "✅ Создать расписание";
    pub const CONFIRM_SIGN_UP: &str = "✅ Да, записаться";
    pub const CONFIRM_CANCEL_SIGN_UP: &str = "✅ Да, отменить запись";
    pub const CONFIRM_DELETE_SUBSCRIPTION: &str = "✅ Удалить абонемент";
    pub const CONFIRM_DELETE: &str = "✅ Да, удалить";

    pub const CHANGE_TIME: &str = "🕐 Изменить время";
    pub const CHANGE_PLACE: &str = "📍 Изменить место";
    pub const DELETE_TRAINING: &str = "🗑️ Удалить тренировку";

    pub const ALL_PRESENT: &str = "Все";

    // Menus
    pub const SCHEDULE_MANAGEMENT: &str = "📅 Управление расписанием";
    pub const SUBSCRIPTION_MANAGEMENT: &str = "💳 Управление абонементами";
    pub const BACK_TO_MAIN: &str = "◀️ Назад в главное меню";

    // Coach entry points
    pub const ADD_TRAINING: &str = "➕ Добавить тренировку";
    pub const EDIT_TRAINING: &str = "✏️ Редактировать тренировку";
    pub const CREATE_FROM_TEMPLATES: &str = "📋 Создать из шаблонов";
    pub const MY_SCHEDULE: &str = "📅 Мое расписание";
    pub const MARK_ATTENDANCE: &str = "✅ Отметить посещаемость";
    pub const ADD_SUBSCRIPTION: &str = "➕ Добавить абонемент";
    pub const DELETE_SUBSCRIPTION: &str = "🗑️ Удалить абонемент";
    pub const STUDENTS: &str = "👥 Мои ученики";

    // Student entry points
    pub const SIGN_UP: &str = "📝 Записаться на тренировку";
    pub const CANCEL_SIGN_UP: &str = "🚫 Отменить запись";
    pub const MY_BOOKINGS: &str = "📅 Мои записи";
    pub const MY_SUBSCRIPTION: &str = "🎫 Мой абонемент";
}

/// Response to one inbound chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// No flow is active; show the menu for the sender's role
    Menu { menu: Menu, role: Option<Role> },
    /// The flow advanced and needs more input
    Prompt { prompt: Prompt },
    /// Input was rejected; the flow stays where it was
    Invalid { problem: InputProblem, prompt: Prompt },
    /// The flow was abandoned with no side effects
    Cancelled,
    /// The flow finished
    Done { outcome: Outcome },
    /// The flow ended without doing what was asked
    Failed { failure: Failure },
}

impl Reply {
    pub fn prompt(prompt: Prompt) -> Self {
        Reply::Prompt { prompt }
    }

    pub fn invalid(problem: InputProblem, prompt: Prompt) -> Self {
        Reply::Invalid { problem, prompt }
    }

    pub fn done(outcome: Outcome) -> Self {
        Reply::Done { outcome }
    }

    pub fn failed(failure: Failure) -> Self {
        Reply::Failed { failure }
    }

    /// Whether this reply leaves the chat without an active flow
    pub fn ends_flow(&self) -> bool {
        !matches!(self, Reply::Prompt { .. } | Reply::Invalid { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Menu {
    Main,
    ScheduleManagement,
    SubscriptionManagement,
}

/// The input a flow is waiting for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Prompt {
    ChooseGroup {
        groups: Vec<Group>,
    },
    ChooseDate {
        options: Vec<String>,
    },
    ChooseStartTime {
        date: NaiveDate,
    },
    ChooseDuration {
        options: Vec<String>,
    },
    ConfirmTraining {
        group: Group,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
    ChooseTraining {
        date: NaiveDate,
        trainings: Vec<TrainingView>,
    },
    ChooseTrainingAction {
        training: TrainingView,
        actions: Vec<String>,
    },
    EnterTimeRange {
        training: TrainingView,
    },
    EnterDescription {
        training: TrainingView,
    },
    ConfirmTrainingDeletion {
        training: TrainingView,
    },
    ChooseWeeksCount {
        options: Vec<String>,
        max_weeks: u32,
    },
    ConfirmSchedule {
        first_day: NaiveDate,
        last_day: NaiveDate,
        weeks: u32,
    },
    ConfirmSignUp {
        training: TrainingView,
        remaining_lessons: u32,
    },
    ChooseBooking {
        bookings: Vec<Booking>,
    },
    ConfirmCancellation {
        booking: Booking,
    },
    ChooseStudent {
        students: Vec<Student>,
    },
    ChooseSubscription {
        student: Student,
        subscriptions: Vec<Subscription>,
    },
    ConfirmSubscriptionDeletion {
        student: Student,
        subscription: Subscription,
    },
    ChoosePlan {
        student: Student,
        plans: Vec<SubscriptionPlan>,
    },
    ConfirmSubscription {
        student: Student,
        plan: SubscriptionPlan,
    },
    ChooseAttendees {
        training: TrainingView,
        participants: Vec<Participant>,
    },
    ConfirmAttendance {
        training: TrainingView,
        attendees: Vec<Participant>,
    },
    ChoosePeriod {
        options: Vec<String>,
    },
}

/// Why a message was not accepted at the current step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum InputProblem {
    UnknownOption,
    InvalidDate,
    DateInPast,
    InvalidTime,
    TimeInPast,
    EndNotAfterStart,
    InvalidPeriod,
    IndexOutOfRange { max: usize },
    InvalidWeeksCount { max: u32 },
    EmptyText,
    NoTrainingsOnDate { date: NaiveDate },
}

/// Why a flow ended without doing what was asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Failure {
    NotRegisteredUser,
    CoachOnly,
    StudentOnly,
    CoachRegistrationClosed,
    NoGroups,
    NoStudents,
    NoSubscriptions,
    NoBookings,
    NoParticipants,
    NoActiveSubscription,
    AlreadyRegistered,
    NotRegistered,
    TrainingFull { capacity: u32 },
    TrainingStarted,
    /// The training or subscription is gone, usually removed by someone else
    NotFound,
    CoachUnavailable,
    SlotTaken,
    /// Storage or other unexpected failure; details are in the service log
    Internal,
}

/// Result of a finished flow or a read-only request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    RegisteredAs {
        role: Role,
    },
    TrainingCreated {
        training: TrainingView,
    },
    TrainingUpdated {
        training: TrainingView,
    },
    TrainingDeleted {
        training_id: TrainingId,
    },
    ScheduleGenerated {
        created: u32,
        first_day: NaiveDate,
        last_day: NaiveDate,
    },
    SignedUp {
        training: TrainingView,
    },
    SignUpCancelled {
        training: TrainingView,
    },
    SubscriptionIssued {
        student: Student,
        subscription: Subscription,
    },
    SubscriptionDeleted {
        subscription_id: SubscriptionId,
    },
    AttendanceRecorded {
        training: TrainingView,
        marks: Vec<AttendanceMark>,
    },
    Schedule {
        from: NaiveDate,
        to: NaiveDate,
        trainings: Vec<TrainingView>,
    },
    Bookings {
        bookings: Vec<Booking>,
    },
    SubscriptionStatus {
        active: Option<Subscription>,
    },
    Students {
        students: Vec<Student>,
    },
}
