//! Learning events as seen by the worker.
//!
//! Messages arrive as untyped JSON objects. This module holds the checks a
//! message must pass before it reaches storage and the single enrichment
//! step applied to it.
//!
//! # Event Flow
//!
//! 1. Transport decodes a message into a [`RawEvent`]
//! 2. [`validate_event`] rejects events without `event_type` or `payload`
//! 3. [`enrich_event`] stamps `processed_at`
//! 4. `EventProcessor` writes the raw event, then the quiz answer if any

pub mod types;

pub use types::{
    PROCESSED_AT, RawEvent, Rejection, ValidatedEvent, enrich_event, event_type_of, field_text,
    validate_event,
};
