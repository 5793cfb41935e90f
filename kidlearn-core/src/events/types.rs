//! Raw event type, validation and enrichment.

use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A decoded message: an untyped JSON object.
pub type RawEvent = Map<String, Value>;

/// Key written by [`enrich_event`].
pub const PROCESSED_AT: &str = "processed_at";

const REQUIRED_FIELDS: [&str; 2] = ["event_type", "payload"];

/// Why an event was dropped before storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("event missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("event_type must be a non-empty string")]
    InvalidEventType,

    #[error("event payload must be a JSON object")]
    PayloadNotObject,
}

/// The required parts of an event that passed [`validate_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub event_type: String,
    pub payload: Map<String, Value>,
}

/// Check that an event can be stored.
///
/// Requires `event_type` (a non-empty string) and `payload` (an object).
/// All missing fields are reported together.
pub fn validate_event(event: &RawEvent) -> Result<ValidatedEvent, Rejection> {
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !event.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(Rejection::MissingFields(missing));
    }

    let event_type = match event.get("event_type") {
        Some(Value::String(event_type)) if !event_type.is_empty() => event_type.clone(),
        _ => return Err(Rejection::InvalidEventType),
    };

    let Some(Value::Object(payload)) = event.get("payload") else {
        return Err(Rejection::PayloadNotObject);
    };

    Ok(ValidatedEvent {
        event_type,
        payload: payload.clone(),
    })
}

/// Stamp `processed_at` with the current UTC time, replacing any value the
/// publisher sent. Returns the timestamp that was written.
pub fn enrich_event(event: &mut RawEvent) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    let stamp = now
        .format(&Rfc3339)
        .map(Value::String)
        .unwrap_or_else(|_| Value::from(now.unix_timestamp()));
    event.insert(PROCESSED_AT.to_string(), stamp);
    now
}

/// The event type for log context, `"unknown"` if absent or not a string.
pub fn event_type_of(event: &RawEvent) -> &str {
    event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

/// Text form of an optional pass-through field.
///
/// JSON null counts as absent. Strings are taken as-is, other values are
/// passed as their JSON text and left for the database to accept or refuse.
pub fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
