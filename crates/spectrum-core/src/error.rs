//! Core error taxonomy

use chrono::{NaiveDate, NaiveTime};
use spectrum_api::UpdateError;
use spectrum_store::StoreError;
use spectrum_util::{GroupId, TemplateId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Student is already registered for this training")]
    AlreadyRegistered,

    #[error("Student is not registered for this training")]
    NotRegistered,

    #[error("Training is full ({capacity} places)")]
    TrainingFull { capacity: u32 },

    #[error("No active subscription")]
    NoActiveSubscription,

    #[error("Template {template_id}: cannot use time '{value}'")]
    TemplateParse { template_id: TemplateId, value: String },

    #[error("Group {group_id} already has a training on {date} at {start_time}")]
    SlotAlreadyExists {
        group_id: GroupId,
        date: NaiveDate,
        start_time: NaiveTime,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Coach already has a training at that time")]
    CoachUnavailable,

    #[error("Training has already started")]
    TrainingStarted,

    #[error("Training has not started yet")]
    TrainingNotStarted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<UpdateError> for CoreError {
    fn from(e: UpdateError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
