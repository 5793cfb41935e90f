//! EventProcessor.
//!
//! The EventProcessor is responsible for:
//! - Validating a decoded message (`event_type` and an object `payload`)
//! - Stamping `processed_at`
//! - Storing the raw event
//! - Storing a denormalized quiz answer for complete `quiz_answer` events
//!
//! Invalid events are not errors: they are logged and reported as
//! [`ProcessOutcome::Rejected`]. Only store failures are returned as
//! [`ProcessError`]. The two writes commit separately, so a failed quiz
//! answer insert leaves its raw event in place.

use crate::entities::{InsertLearningEvent, InsertQuizAnswer};
use crate::events::{
    RawEvent, Rejection, ValidatedEvent, enrich_event, field_text, validate_event,
};
use crate::store::EventStore;
use kanau::processor::Processor;
use kidlearn_sdk::objects::{QuizAnswerPayload, event_types};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur while storing an event.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The raw event insert failed, nothing was stored.
    #[error("failed to store learning event: {0}")]
    StoreEvent(#[source] sqlx::Error),

    /// The raw event was committed but its quiz answer was not.
    #[error("stored learning event {event_id} but failed to store its quiz answer: {source}")]
    StoreQuizAnswer {
        event_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
}

/// What happened to a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Dropped before storage.
    Rejected(Rejection),
    /// Raw event stored, plus the quiz answer row if one was derived.
    Stored {
        event_id: Uuid,
        quiz_answer_id: Option<i64>,
    },
}

/// Validates, enriches and stores learning events.
///
/// Holds no state between events besides the store handle.
pub struct EventProcessor<S> {
    store: S,
}

impl<S: EventStore> EventProcessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: EventStore> Processor<RawEvent> for EventProcessor<S> {
    type Output = ProcessOutcome;
    type Error = ProcessError;

    async fn process(&self, mut event: RawEvent) -> Result<ProcessOutcome, ProcessError> {
        let validated = match validate_event(&event) {
            Ok(validated) => validated,
            Err(rejection) => {
                warn!(reason = %rejection, "Dropping invalid event");
                return Ok(ProcessOutcome::Rejected(rejection));
            }
        };

        let processed_at = enrich_event(&mut event);
        let insert = raw_event_insert(&event, &validated, processed_at);

        let event_id = self
            .store
            .insert_event(insert)
            .await
            .map_err(ProcessError::StoreEvent)?;
        info!(event_id = %event_id, event_type = %validated.event_type, "Stored event");

        let Some(answer) = quiz_answer_insert(&event, &validated, event_id) else {
            if validated.event_type == event_types::QUIZ_ANSWER {
                debug!(event_id = %event_id, "Quiz answer payload incomplete, not denormalized");
            }
            return Ok(ProcessOutcome::Stored {
                event_id,
                quiz_answer_id: None,
            });
        };

        let answer_id = self
            .store
            .insert_quiz_answer(answer)
            .await
            .map_err(|source| ProcessError::StoreQuizAnswer { event_id, source })?;
        info!(answer_id, event_id = %event_id, "Stored quiz answer");

        Ok(ProcessOutcome::Stored {
            event_id,
            quiz_answer_id: Some(answer_id),
        })
    }
}

/// Build the raw event insert from a validated, enriched event.
fn raw_event_insert(
    event: &RawEvent,
    validated: &ValidatedEvent,
    processed_at: time::OffsetDateTime,
) -> InsertLearningEvent {
    InsertLearningEvent {
        id: field_text(event.get("id")),
        event_type: validated.event_type.clone(),
        payload: validated.payload.clone(),
        user_id: field_text(event.get("user_id")),
        session_id: field_text(event.get("session_id")),
        created_at: field_text(event.get("created_at")),
        processed_at,
    }
}

/// Derive a quiz answer row, if the event is a complete `quiz_answer`.
///
/// Payload values are passed through as text and typed by the database.
/// A missing `user_id` becomes an empty string rather than NULL, matching
/// what the analytics queries have always received.
fn quiz_answer_insert(
    event: &RawEvent,
    validated: &ValidatedEvent,
    event_id: Uuid,
) -> Option<InsertQuizAnswer> {
    let payload = &validated.payload;
    if validated.event_type != event_types::QUIZ_ANSWER
        || !QuizAnswerPayload::has_required_keys(payload)
    {
        return None;
    }

    Some(InsertQuizAnswer {
        user_id: field_text(event.get("user_id")).unwrap_or_default(),
        quiz_id: field_text(payload.get("quiz_id")),
        question_id: field_text(payload.get("question_id")),
        selected_answer: field_text(payload.get("selected_answer")),
        is_correct: field_text(payload.get("is_correct")),
        time_spent_ms: field_text(payload.get("time_spent_ms")),
        hints_used: field_text(payload.get("hints_used")),
        event_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PROCESSED_AT;
    use crate::store::recording::RecordingStore;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const EVENT_ID: Uuid = Uuid::from_u128(0x456);

    fn event(value: Value) -> RawEvent {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test events are objects"),
        }
    }

    fn processor(store: RecordingStore) -> (EventProcessor<Arc<RecordingStore>>, Arc<RecordingStore>) {
        let store = Arc::new(store);
        (EventProcessor::new(store.clone()), store)
    }

    fn quiz_answer_event() -> RawEvent {
        event(json!({
            "event_type": "quiz_answer",
            "payload": {
                "quiz_id": "q1",
                "question_id": "qq1",
                "selected_answer": "Water",
                "is_correct": true,
                "time_spent_ms": 1500,
            },
            "user_id": "u2",
        }))
    }

    #[tokio::test]
    async fn test_lesson_view_stores_raw_event_only() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));

        let outcome = processor
            .process(event(json!({"event_type": "lesson_view", "payload": {"lesson_id": "L2"}})))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Stored {
                event_id: EVENT_ID,
                quiz_answer_id: None
            }
        );
        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "lesson_view");
        assert_eq!(events[0].payload["lesson_id"], "L2");
        assert_eq!(events[0].id, None);
        assert_eq!(events[0].user_id, None);
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_quiz_answer_is_denormalized_with_event_reference() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));

        let outcome = processor.process(quiz_answer_event()).await.unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Stored {
                event_id: EVENT_ID,
                quiz_answer_id: Some(1)
            }
        );
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.events()[0].user_id.as_deref(), Some("u2"));
        assert_eq!(
            store.answers(),
            vec![InsertQuizAnswer {
                user_id: "u2".to_string(),
                quiz_id: Some("q1".to_string()),
                question_id: Some("qq1".to_string()),
                selected_answer: Some("Water".to_string()),
                is_correct: Some("true".to_string()),
                time_spent_ms: Some("1500".to_string()),
                hints_used: None,
                event_id: EVENT_ID,
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_event_type_makes_no_store_calls() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));

        let outcome = processor
            .process(event(json!({"payload": {"x": 1}})))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Rejected(Rejection::MissingFields(vec!["event_type"]))
        );
        assert!(store.events().is_empty());
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_events_make_no_store_calls() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));

        for invalid in [
            json!({"event_type": "quiz_answer"}),
            json!({"event_type": "quiz_answer", "payload": "not a dict"}),
            json!({"event_type": "quiz_answer", "payload": [1]}),
            json!({"event_type": "", "payload": {}}),
        ] {
            let outcome = processor.process(event(invalid)).await.unwrap();
            assert!(matches!(outcome, ProcessOutcome::Rejected(_)));
        }

        assert!(store.events().is_empty());
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_quiz_answer_stores_raw_event_only() {
        for missing in QuizAnswerPayload::REQUIRED_KEYS {
            let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
            let mut e = quiz_answer_event();
            e.get_mut("payload")
                .and_then(Value::as_object_mut)
                .unwrap()
                .remove(missing);

            processor.process(e).await.unwrap();

            assert_eq!(store.events().len(), 1, "missing {missing}");
            assert!(store.answers().is_empty(), "missing {missing}");
        }
    }

    #[tokio::test]
    async fn test_other_event_types_with_quiz_fields_are_not_denormalized() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let mut e = quiz_answer_event();
        e.insert("event_type".to_string(), json!("quiz_review"));

        processor.process(e).await.unwrap();

        assert_eq!(store.events().len(), 1);
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_processed_at_is_overwritten_and_stored() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let mut e = quiz_answer_event();
        e.insert(PROCESSED_AT.to_string(), json!("1999-01-01T00:00:00Z"));
        let before = time::OffsetDateTime::now_utc();

        processor.process(e).await.unwrap();

        let events = store.events();
        let stored = &events[0];
        assert!(stored.processed_at >= before);
        assert!(stored.processed_at <= time::OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn test_pass_through_fields() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let e = event(json!({
            "id": "6f1c3a52-8d7e-4f0b-9a61-2c5d8e4b7a10",
            "event_type": "lesson_view",
            "payload": {},
            "user_id": "u1",
            "session_id": "s1",
            "created_at": "2025-03-01T12:00:00Z",
        }));

        processor.process(e).await.unwrap();

        let events = store.events();
        let stored = &events[0];
        assert_eq!(stored.id.as_deref(), Some("6f1c3a52-8d7e-4f0b-9a61-2c5d8e4b7a10"));
        assert_eq!(stored.session_id.as_deref(), Some("s1"));
        assert_eq!(stored.created_at.as_deref(), Some("2025-03-01T12:00:00Z"));
    }

    // A quiz answer without a user is stored with an empty user id, not NULL.
    // Kept as-is until the analytics side decides what an anonymous answer is.
    #[tokio::test]
    async fn test_quiz_answer_without_user_gets_empty_user_id() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let mut e = quiz_answer_event();
        e.remove("user_id");

        processor.process(e).await.unwrap();

        assert_eq!(store.events()[0].user_id, None);
        assert_eq!(store.answers()[0].user_id, "");
    }

    #[tokio::test]
    async fn test_hints_used_defaults_to_zero_and_is_passed_through() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let mut with_hints = quiz_answer_event();
        with_hints
            .get_mut("payload")
            .and_then(Value::as_object_mut)
            .unwrap()
            .insert("hints_used".to_string(), json!(2));

        processor.process(quiz_answer_event()).await.unwrap();
        processor.process(with_hints).await.unwrap();

        let answers = store.answers();
        assert_eq!(answers[0].hints_used, None);
        assert_eq!(answers[1].hints_used.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_loosely_typed_quiz_fields_are_passed_through() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let e = event(json!({
            "event_type": "quiz_answer",
            "payload": {
                "quiz_id": "q1",
                "question_id": "qq1",
                "selected_answer": "Water",
                "is_correct": "true",
                "time_spent_ms": 1500.0,
                "hints_used": "2",
            },
            "user_id": "u2",
        }));

        let outcome = processor.process(e).await.unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Stored {
                event_id: EVENT_ID,
                quiz_answer_id: Some(1)
            }
        );
        let answers = store.answers();
        assert_eq!(answers[0].is_correct.as_deref(), Some("true"));
        assert_eq!(answers[0].time_spent_ms.as_deref(), Some("1500.0"));
        assert_eq!(answers[0].hints_used.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_out_of_range_time_spent_is_not_dropped() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID));
        let mut e = quiz_answer_event();
        e.get_mut("payload")
            .and_then(Value::as_object_mut)
            .unwrap()
            .insert("time_spent_ms".to_string(), json!(9_000_000_000_i64));

        processor.process(e).await.unwrap();

        assert_eq!(
            store.answers()[0].time_spent_ms.as_deref(),
            Some("9000000000")
        );
    }

    #[tokio::test]
    async fn test_raw_insert_failure_skips_denormalization() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID).failing_events());

        let err = processor.process(quiz_answer_event()).await.unwrap_err();

        assert!(matches!(err, ProcessError::StoreEvent(_)));
        assert_eq!(store.events().len(), 1);
        assert!(store.answers().is_empty());
    }

    #[tokio::test]
    async fn test_quiz_answer_failure_keeps_raw_event() {
        let (processor, store) = processor(RecordingStore::returning(EVENT_ID).failing_answers());

        let err = processor.process(quiz_answer_event()).await.unwrap_err();

        assert!(matches!(
            err,
            ProcessError::StoreQuizAnswer { event_id, .. } if event_id == EVENT_ID
        ));
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.answers().len(), 1);
    }
}
