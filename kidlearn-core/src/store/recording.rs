//! In-memory `EventStore` double for processor and worker tests.

use super::EventStore;
use crate::entities::{InsertLearningEvent, InsertQuizAnswer};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Records every insert and returns a fixed event id.
///
/// Failures can be switched on per table to exercise error paths.
#[derive(Debug)]
pub(crate) struct RecordingStore {
    event_id: Uuid,
    fail_events: bool,
    fail_answers: bool,
    events: Mutex<Vec<InsertLearningEvent>>,
    answers: Mutex<Vec<InsertQuizAnswer>>,
    closes: AtomicUsize,
}

impl RecordingStore {
    pub(crate) fn returning(event_id: Uuid) -> Self {
        Self {
            event_id,
            fail_events: false,
            fail_answers: false,
            events: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    pub(crate) fn failing_answers(mut self) -> Self {
        self.fail_answers = true;
        self
    }

    pub(crate) fn events(&self) -> Vec<InsertLearningEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn answers(&self) -> Vec<InsertQuizAnswer> {
        self.answers.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for RecordingStore {
    async fn insert_event(&self, insert: InsertLearningEvent) -> Result<Uuid, sqlx::Error> {
        self.events.lock().unwrap().push(insert);
        if self.fail_events {
            return Err(sqlx::Error::Protocol("connection reset".into()));
        }
        Ok(self.event_id)
    }

    async fn insert_quiz_answer(&self, insert: InsertQuizAnswer) -> Result<i64, sqlx::Error> {
        let mut answers = self.answers.lock().unwrap();
        answers.push(insert);
        if self.fail_answers {
            return Err(sqlx::Error::Protocol("connection reset".into()));
        }
        Ok(answers.len() as i64)
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
