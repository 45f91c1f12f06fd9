//! Command handling for the chat transport and the calendar surface
//!
//! Handlers are synchronous; the service runs them on the blocking pool.

use chrono::{DateTime, Local};
use spectrum_api::{
    Coach, Command, ErrorCode, ErrorInfo, HealthStatus, ResponsePayload, Student, Training,
    TrainingUpdate,
};
use spectrum_core::{CoreError, Conversation};
use spectrum_util::{TelegramId, TrainingId};
use tracing::{error, info};

type CommandResult = Result<ResponsePayload, ErrorInfo>;

pub fn handle_command(
    conversation: &Conversation,
    command: Command,
    now: DateTime<Local>,
) -> CommandResult {
    match command {
        Command::ChatMessage {
            chat_id,
            sender,
            text,
        } => {
            let reply = conversation.handle(chat_id, &sender, &text, now);
            Ok(ResponsePayload::Reply { reply })
        }

        Command::ListTrainings { from, to } => {
            if from > to {
                return Err(ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    "Period ends before it starts",
                ));
            }
            let trainings = conversation.schedule().schedule(from, to).map_err(reject)?;
            Ok(ResponsePayload::Trainings { trainings })
        }

        Command::TrainingDetails { training_id } => {
            let training = conversation
                .schedule()
                .get_training(training_id)
                .map_err(reject)?;
            let stats = conversation
                .booking()
                .training_stats(training_id)
                .map_err(reject)?;
            let participants = conversation
                .booking()
                .participants(training_id)
                .map_err(reject)?;
            Ok(ResponsePayload::TrainingDetails {
                training,
                stats,
                participants,
            })
        }

        Command::SignUp {
            telegram_id,
            training_id,
        } => {
            let student = student_for(conversation, telegram_id)?;
            let training = training_for(conversation, training_id)?;
            if training.has_started(&now) {
                return Err(reject(CoreError::TrainingStarted));
            }
            if conversation
                .booking()
                .ledger()
                .active(student.id, now)
                .map_err(reject)?
                .is_none()
            {
                return Err(reject(CoreError::NoActiveSubscription));
            }

            let attendance = conversation
                .booking()
                .sign_up(student.id, training_id)
                .map_err(reject)?;
            Ok(ResponsePayload::SignedUp { attendance })
        }

        Command::CancelSignUp {
            telegram_id,
            training_id,
        } => {
            let student = student_for(conversation, telegram_id)?;
            let training = training_for(conversation, training_id)?;
            if training.has_started(&now) {
                return Err(reject(CoreError::TrainingStarted));
            }

            conversation
                .booking()
                .cancel_sign_up(student.id, training_id)
                .map_err(reject)?;
            Ok(ResponsePayload::SignUpCancelled)
        }

        Command::UpdateTraining {
            telegram_id,
            training_id,
            fields,
        } => {
            coach_for(conversation, telegram_id)?;
            let update = TrainingUpdate::from_fields(&fields)
                .map_err(|e| ErrorInfo::new(ErrorCode::InvalidRequest, e.to_string()))?;

            let schedule = conversation.schedule();
            let training = schedule
                .update_training(training_id, &update)
                .map_err(reject)?;
            let training = schedule.view(training).map_err(reject)?;
            Ok(ResponsePayload::TrainingUpdated { training })
        }

        Command::MarkAttendance {
            telegram_id,
            training_id,
            student_ids,
        } => {
            let coach = coach_for(conversation, telegram_id)?;
            let training = training_for(conversation, training_id)?;
            if training.coach_id != Some(coach.id) {
                return Err(ErrorInfo::new(
                    ErrorCode::PermissionDenied,
                    "Only the training's coach can mark attendance",
                ));
            }
            if !training.has_started(&now) {
                return Err(reject(CoreError::TrainingNotStarted));
            }

            let marks = conversation
                .booking()
                .mark_present(training_id, &student_ids, Some(coach.id), now)
                .map_err(reject)?;
            info!(
                training_id = %training_id,
                coach_id = %coach.id,
                count = marks.len(),
                "Attendance marked from calendar"
            );
            Ok(ResponsePayload::AttendanceMarked { marks })
        }

        Command::GetHealth => {
            let store_ok = conversation.store().is_healthy();
            Ok(ResponsePayload::Health(HealthStatus {
                live: true,
                ready: store_ok,
                store_ok,
                active_sessions: conversation.sessions().active_flows(),
            }))
        }

        Command::Ping => Ok(ResponsePayload::Pong),
    }
}

fn student_for(conversation: &Conversation, telegram_id: TelegramId) -> Result<Student, ErrorInfo> {
    let store = conversation.store();
    let user = store
        .user_by_telegram_id(telegram_id)
        .map_err(reject)?
        .ok_or_else(|| unknown_user(telegram_id))?;
    store
        .student_for_user(user.id)
        .map_err(reject)?
        .ok_or_else(|| ErrorInfo::new(ErrorCode::PermissionDenied, "Students only"))
}

fn coach_for(conversation: &Conversation, telegram_id: TelegramId) -> Result<Coach, ErrorInfo> {
    let store = conversation.store();
    let user = store
        .user_by_telegram_id(telegram_id)
        .map_err(reject)?
        .ok_or_else(|| unknown_user(telegram_id))?;
    store
        .coach_for_user(user.id)
        .map_err(reject)?
        .ok_or_else(|| ErrorInfo::new(ErrorCode::PermissionDenied, "Coaches only"))
}

fn training_for(conversation: &Conversation, training_id: TrainingId) -> Result<Training, ErrorInfo> {
    Ok(conversation
        .schedule()
        .get_training(training_id)
        .map_err(reject)?
        .training)
}

fn unknown_user(telegram_id: TelegramId) -> ErrorInfo {
    ErrorInfo::new(
        ErrorCode::UnknownUser,
        format!("No user with telegram id {}", telegram_id),
    )
}

/// Map a core failure onto the protocol error codes
fn reject(e: impl Into<CoreError>) -> ErrorInfo {
    let e = e.into();
    let code = match &e {
        CoreError::AlreadyRegistered => ErrorCode::AlreadyRegistered,
        CoreError::NotRegistered => ErrorCode::NotRegistered,
        CoreError::TrainingFull { .. } => ErrorCode::TrainingFull,
        CoreError::NoActiveSubscription => ErrorCode::NoActiveSubscription,
        CoreError::NotFound(_) => ErrorCode::NotFound,
        CoreError::Validation(_) => ErrorCode::InvalidRequest,
        CoreError::SlotAlreadyExists { .. } | CoreError::CoachUnavailable => ErrorCode::Conflict,
        CoreError::TrainingStarted => ErrorCode::TrainingStarted,
        CoreError::TrainingNotStarted => ErrorCode::TrainingNotStarted,
        CoreError::TemplateParse { .. } | CoreError::Store(_) => {
            error!(error = %e, "Command failed");
            ErrorCode::InternalError
        }
    };
    ErrorInfo::new(code, e.to_string())
}
