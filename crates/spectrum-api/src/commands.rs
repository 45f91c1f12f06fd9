//! Command types for the spectrumd protocol

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use spectrum_util::{ChatId, ClientId, StudentId, TelegramId, TrainingId};

use crate::{
    API_VERSION, Attendance, AttendanceMark, HealthStatus, NewUser, Participant, Reply,
    TrainingStats, TrainingView,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnsupportedVersion,
    UnknownUser,
    NotFound,
    AlreadyRegistered,
    NotRegistered,
    TrainingFull,
    NoActiveSubscription,
    /// The slot or the coach's time is already taken
    Conflict,
    /// Sign-ups can only change before the training starts
    TrainingStarted,
    /// Attendance can only be marked once the training has started
    TrainingNotStarted,
    PermissionDenied,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// A chat message forwarded by the messenger transport
    ChatMessage {
        chat_id: ChatId,
        sender: NewUser,
        text: String,
    },

    // Calendar surface
    /// Trainings whose date falls in `from..=to`
    ListTrainings { from: NaiveDate, to: NaiveDate },

    /// One training with its stats and participants
    TrainingDetails { training_id: TrainingId },

    SignUp {
        telegram_id: TelegramId,
        training_id: TrainingId,
    },

    CancelSignUp {
        telegram_id: TelegramId,
        training_id: TrainingId,
    },

    /// Partial update from the calendar. Only the fields of
    /// `TrainingUpdate::FIELDS` are accepted; the caller must be a coach.
    UpdateTraining {
        telegram_id: TelegramId,
        training_id: TrainingId,
        fields: serde_json::Map<String, serde_json::Value>,
    },

    /// Mark the listed students present; the caller must coach the training
    MarkAttendance {
        telegram_id: TelegramId,
        training_id: TrainingId,
        student_ids: Vec<StudentId>,
    },

    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Reply {
        reply: Reply,
    },
    Trainings {
        trainings: Vec<TrainingView>,
    },
    TrainingDetails {
        training: TrainingView,
        stats: TrainingStats,
        participants: Vec<Participant>,
    },
    TrainingUpdated {
        training: TrainingView,
    },
    SignedUp {
        attendance: Attendance,
    },
    SignUpCancelled,
    AttendanceMarked {
        marks: Vec<AttendanceMark>,
    },
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Failure, labels};

    #[test]
    fn request_serialization() {
        let req = Request::new(
            7,
            Command::ChatMessage {
                chat_id: ChatId::new(42),
                sender: NewUser {
                    telegram_id: TelegramId::new(42),
                    first_name: "Анна".into(),
                    last_name: None,
                    username: Some("anna".into()),
                },
                text: labels::SIGN_UP.into(),
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 7);
        assert_eq!(parsed.api_version, API_VERSION);
        match parsed.command {
            Command::ChatMessage { chat_id, text, .. } => {
                assert_eq!(chat_id, ChatId::new(42));
                assert_eq!(text, labels::SIGN_UP);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn response_serialization() {
        let resp = Response::success(
            1,
            ResponsePayload::Reply {
                reply: Reply::failed(Failure::TrainingFull { capacity: 8 }),
            },
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["ok"]["type"], "reply");
        assert_eq!(json["result"]["ok"]["reply"]["kind"], "failed");

        let err = Response::error(2, ErrorInfo::new(ErrorCode::RateLimited, "slow down"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["result"]["err"]["code"], "rate_limited");
    }
}
