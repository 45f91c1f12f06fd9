//! Partial updates for trainings and week templates
//!
//! Only the fields named here can ever be written. Callers that receive a
//! loose field map (the calendar web surface) go through `from_fields`,
//! which rejects anything outside the allow-list before it reaches a store.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spectrum_util::{CoachId, GroupId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("field is not updatable: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("update contains no fields")]
    Empty,

    #[error("end time must be after start time")]
    EndBeforeStart,
}

/// Fields of a training that may change after creation.
///
/// Nullable columns use `Option<Option<T>>`: the outer `None` leaves the
/// column alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingUpdate {
    pub group_id: Option<GroupId>,
    pub coach_id: Option<Option<CoachId>>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub description: Option<String>,
    pub max_participants: Option<Option<u32>>,
}

impl TrainingUpdate {
    pub const FIELDS: &'static [&'static str] = &[
        "group_id",
        "coach_id",
        "date",
        "start_time",
        "end_time",
        "description",
        "max_participants",
    ];

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn times(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            start_time: Some(start_time),
            end_time: Some(end_time),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Build an update from a JSON object, rejecting unknown fields.
    ///
    /// Dates use `YYYY-MM-DD`, times `HH:MM` or `HH:MM:SS`, and `null`
    /// clears a nullable column.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, UpdateError> {
        let mut update = Self::default();

        for (name, value) in fields {
            match name.as_str() {
                "group_id" => update.group_id = Some(GroupId::new(int_field("group_id", value)?)),
                "coach_id" => {
                    update.coach_id = Some(nullable(value, |v| {
                        int_field("coach_id", v).map(CoachId::new)
                    })?)
                }
                "date" => update.date = Some(date_field("date", value)?),
                "start_time" => update.start_time = Some(time_field("start_time", value)?),
                "end_time" => update.end_time = Some(time_field("end_time", value)?),
                "description" => update.description = Some(string_field("description", value)?),
                "max_participants" => {
                    update.max_participants = Some(nullable(value, |v| {
                        let n = int_field("max_participants", v)?;
                        u32::try_from(n).ok().filter(|n| *n > 0).ok_or_else(|| {
                            UpdateError::InvalidValue {
                                field: "max_participants",
                                reason: format!("expected a positive number, got {}", n),
                            }
                        })
                    })?)
                }
                other => return Err(UpdateError::UnknownField(other.to_string())),
            }
        }

        update.validate()?;
        Ok(update)
    }

    /// Checks that hold without looking at the stored row
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.is_empty() {
            return Err(UpdateError::Empty);
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(UpdateError::EndBeforeStart);
            }
        }
        Ok(())
    }
}

/// Fields of a week template that may change after creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUpdate {
    pub group_id: Option<GroupId>,
    pub day_of_week: Option<u8>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl TemplateUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.is_empty() {
            return Err(UpdateError::Empty);
        }
        if let Some(day) = self.day_of_week {
            if !(1..=7).contains(&day) {
                return Err(UpdateError::InvalidValue {
                    field: "day_of_week",
                    reason: format!("expected 1..=7, got {}", day),
                });
            }
        }
        Ok(())
    }
}

fn nullable<T>(
    value: &Value,
    parse: impl FnOnce(&Value) -> Result<T, UpdateError>,
) -> Result<Option<T>, UpdateError> {
    if value.is_null() {
        Ok(None)
    } else {
        parse(value).map(Some)
    }
}

fn int_field(field: &'static str, value: &Value) -> Result<i64, UpdateError> {
    value.as_i64().ok_or_else(|| UpdateError::InvalidValue {
        field,
        reason: format!("expected an integer, got {}", value),
    })
}

fn string_field(field: &'static str, value: &Value) -> Result<String, UpdateError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| UpdateError::InvalidValue {
            field,
            reason: format!("expected a string, got {}", value),
        })
}

fn date_field(field: &'static str, value: &Value) -> Result<NaiveDate, UpdateError> {
    let raw = string_field(field, value)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| UpdateError::InvalidValue {
        field,
        reason: e.to_string(),
    })
}

fn time_field(field: &'static str, value: &Value) -> Result<NaiveTime, UpdateError> {
    let raw = string_field(field, value)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(|e| UpdateError::InvalidValue {
            field,
            reason: e.to_string(),
        })
}
