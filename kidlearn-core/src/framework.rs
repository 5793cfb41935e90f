use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

/// Executes the SQL processors in [`crate::entities`] against a pool.
///
/// Cloning is cheap, the pool is reference counted.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Commit `tx` if `result` is `Ok`, otherwise roll it back and return the
/// original error. A failed rollback is logged, the connection is discarded
/// by the pool in that case.
pub async fn finish_transaction<T>(
    tx: Transaction<'_, Postgres>,
    result: Result<T, sqlx::Error>,
) -> Result<T, sqlx::Error> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(e)
        }
    }
}
