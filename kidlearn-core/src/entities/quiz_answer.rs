use crate::framework::{DatabaseProcessor, finish_transaction};
use kanau::processor::Processor;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Insert a denormalized quiz answer derived from a stored `quiz_answer` event.
///
/// Payload values travel as their text form and are cast by Postgres, so
/// `"true"` stores as a boolean and `1500.0` or `"1500"` as an integer.
/// Values the cast refuses fail the insert instead of being replaced.
/// A missing `hints_used` stores as `0`.
pub struct InsertQuizAnswer {
    pub user_id: String,
    pub quiz_id: Option<String>,
    pub question_id: Option<String>,
    pub selected_answer: Option<String>,
    pub is_correct: Option<String>,
    pub time_spent_ms: Option<String>,
    pub hints_used: Option<String>,
    /// Id of the `learning_events` row this answer was derived from.
    pub event_id: Uuid,
}

impl InsertQuizAnswer {
    /// Run the insert inside an open transaction.
    pub async fn execute_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO quiz_answers
                (user_id, quiz_id, question_id, selected_answer, is_correct,
                 time_spent_ms, hints_used, event_id)
            VALUES (
                $1, $2, $3, $4,
                $5::boolean,
                $6::numeric::integer,
                COALESCE($7::numeric::integer, 0),
                $8
            )
            RETURNING id
            "#,
        )
        .bind(&self.user_id)
        .bind(self.quiz_id.as_deref())
        .bind(self.question_id.as_deref())
        .bind(self.selected_answer.as_deref())
        .bind(self.is_correct.as_deref())
        .bind(self.time_spent_ms.as_deref())
        .bind(self.hints_used.as_deref())
        .bind(self.event_id)
        .fetch_one(&mut **tx)
        .await
    }
}

impl Processor<InsertQuizAnswer> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertQuizAnswer")]
    async fn process(&self, insert: InsertQuizAnswer) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = insert.execute_tx(&mut tx).await;
        finish_transaction(tx, result).await
    }
}
