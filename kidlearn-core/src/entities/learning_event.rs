use crate::framework::{DatabaseProcessor, finish_transaction};
use kanau::processor::Processor;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
/// Insert a raw learning event.
///
/// `id` and `created_at` are taken from the publisher when present and
/// cast by Postgres; otherwise the table defaults (`gen_random_uuid()`,
/// `NOW()`) apply. Returns the stored id.
pub struct InsertLearningEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub payload: Map<String, Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub created_at: Option<String>,
    pub processed_at: time::OffsetDateTime,
}

impl InsertLearningEvent {
    /// Run the insert inside an open transaction.
    pub async fn execute_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO learning_events
                (id, user_id, event_type, payload, session_id, created_at, processed_at)
            VALUES (
                COALESCE($1::uuid, gen_random_uuid()),
                $2, $3, $4, $5,
                COALESCE($6::timestamptz, NOW()),
                $7
            )
            RETURNING id
            "#,
        )
        .bind(self.id.as_deref())
        .bind(self.user_id.as_deref())
        .bind(&self.event_type)
        .bind(Json(&self.payload))
        .bind(self.session_id.as_deref())
        .bind(self.created_at.as_deref())
        .bind(self.processed_at)
        .fetch_one(&mut **tx)
        .await
    }
}

impl Processor<InsertLearningEvent> for DatabaseProcessor {
    type Output = Uuid;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertLearningEvent")]
    async fn process(&self, insert: InsertLearningEvent) -> Result<Uuid, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = insert.execute_tx(&mut tx).await;
        finish_transaction(tx, result).await
    }
}
