//! The persistence boundary used by the event processor.
//!
//! [`EventStore`] exposes the two independent writes the pipeline needs and
//! the release of whatever backs them. [`DatabaseProcessor`] is the Postgres
//! implementation.

#[cfg(test)]
pub(crate) mod recording;

use crate::entities::{InsertLearningEvent, InsertQuizAnswer};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a raw event and commit. Returns the stored id.
    async fn insert_event(&self, insert: InsertLearningEvent) -> Result<Uuid, sqlx::Error>;

    /// Insert a denormalized quiz answer and commit. Returns the row id.
    async fn insert_quiz_answer(&self, insert: InsertQuizAnswer) -> Result<i64, sqlx::Error>;

    /// Release the underlying connections. Called once on worker shutdown.
    async fn close(&self);
}

#[async_trait]
impl EventStore for DatabaseProcessor {
    async fn insert_event(&self, insert: InsertLearningEvent) -> Result<Uuid, sqlx::Error> {
        self.process(insert).await
    }

    async fn insert_quiz_answer(&self, insert: InsertQuizAnswer) -> Result<i64, sqlx::Error> {
        self.process(insert).await
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn insert_event(&self, insert: InsertLearningEvent) -> Result<Uuid, sqlx::Error> {
        (**self).insert_event(insert).await
    }

    async fn insert_quiz_answer(&self, insert: InsertQuizAnswer) -> Result<i64, sqlx::Error> {
        (**self).insert_quiz_answer(insert).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
