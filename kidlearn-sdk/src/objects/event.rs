//! Learning event objects.
//!
//! Publishers send a JSON object per event on the learning-events channel.
//! The worker only requires `event_type` and `payload`; everything else is
//! optional and passed through to storage when present.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Well-known values of `event_type`.
///
/// The field is free-form, these are the tags the worker and the
/// frontend agree on.
pub mod event_types {
    /// A single answered quiz question. Denormalized into `quiz_answers`.
    pub const QUIZ_ANSWER: &str = "quiz_answer";
    pub const LESSON_VIEW: &str = "lesson_view";
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid payload json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
}

/// A learning event as published on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl LearningEvent {
    /// Create an event with a fresh id and the current UTC time.
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            user_id: None,
            session_id: None,
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    /// Create a `quiz_answer` event from a typed payload.
    pub fn quiz_answer(
        user_id: impl Into<String>,
        answer: &QuizAnswerPayload,
    ) -> Result<Self, PayloadError> {
        let payload = into_object(serde_json::to_value(answer)?)?;
        Ok(Self::new(event_types::QUIZ_ANSWER, payload).with_user(user_id))
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Serialize into the JSON object sent over the wire.
    pub fn to_message(&self) -> Result<Value, PayloadError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Payload of a `quiz_answer` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswerPayload {
    pub quiz_id: String,
    pub question_id: String,
    pub selected_answer: String,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_ms: Option<i32>,
    #[serde(default)]
    pub hints_used: i32,
}

impl QuizAnswerPayload {
    /// Keys a `quiz_answer` payload must carry to be denormalized.
    pub const REQUIRED_KEYS: [&'static str; 4] =
        ["quiz_id", "question_id", "selected_answer", "is_correct"];

    /// Whether an untyped payload carries every required key.
    pub fn has_required_keys(payload: &Map<String, Value>) -> bool {
        Self::REQUIRED_KEYS
            .iter()
            .all(|key| payload.contains_key(*key))
    }
}

/// Parse a JSON string into a payload object.
pub fn parse_payload(json: &str) -> Result<Map<String, Value>, PayloadError> {
    into_object(serde_json::from_str(json)?)
}

fn into_object(value: Value) -> Result<Map<String, Value>, PayloadError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}
