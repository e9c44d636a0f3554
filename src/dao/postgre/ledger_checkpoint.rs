use sqlx::Error;

use crate::model::{Ledger_Checkpoint, Table};

use super::QueryResult;

impl Table<Ledger_Checkpoint> {
    pub async fn upsert(
        &self,
        checkpoint: &Ledger_Checkpoint,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO core.ledger_checkpoints (
                ledger_index,
                ledger_hash,
                parent_hash,
                close_time,
                close_time_human,
                transaction_count,
                processing_duration_ms
            )
            VALUES($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (ledger_index)
            DO UPDATE SET
                ledger_hash = EXCLUDED.ledger_hash,
                parent_hash = EXCLUDED.parent_hash,
                close_time = EXCLUDED.close_time,
                close_time_human = EXCLUDED.close_time_human,
                transaction_count = EXCLUDED.transaction_count,
                processing_duration_ms = EXCLUDED.processing_duration_ms
            "#,
        )
        .bind(checkpoint.ledger_index)
        .bind(&checkpoint.ledger_hash)
        .bind(&checkpoint.parent_hash)
        .bind(checkpoint.close_time)
        .bind(checkpoint.close_time_human)
        .bind(checkpoint.transaction_count)
        .bind(checkpoint.processing_duration_ms)
        .persistent(true)
        .execute(&self.pool)
        .await
    }

    pub async fn get_one(
        &self,
        ledger_index: i64,
    ) -> Result<Option<Ledger_Checkpoint>, Error> {
        sqlx::query_as(
            r#"
            SELECT
                ledger_index,
                ledger_hash,
                parent_hash,
                close_time,
                close_time_human,
                transaction_count,
                processing_duration_ms
            FROM core.ledger_checkpoints
            WHERE ledger_index = $1
            "#,
        )
        .bind(ledger_index)
        .persistent(true)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_last(&self) -> Result<Option<Ledger_Checkpoint>, Error> {
        sqlx::query_as(
            r#"
            SELECT
                ledger_index,
                ledger_hash,
                parent_hash,
                close_time,
                close_time_human,
                transaction_count,
                processing_duration_ms
            FROM core.ledger_checkpoints
            ORDER BY ledger_index DESC
            LIMIT 1
            "#,
        )
        .persistent(true)
        .fetch_optional(&self.pool)
        .await
    }

    /// Gaps in the checkpoint sequence at or above `floor`, as exclusive
    /// `(gap_begin, gap_end)` pairs.
    pub async fn get_missing(&self, floor: i64) -> Result<Vec<(i64, i64)>, Error> {
        sqlx::query_as(
            r#"
            WITH with_next AS (
                SELECT ledger_index, LEAD(ledger_index) OVER (ORDER BY ledger_index) AS next_index
                FROM core.ledger_checkpoints
                WHERE ledger_index >= $1
            )
            SELECT ledger_index AS gap_begin, next_index AS gap_end
            FROM with_next
            WHERE next_index IS NOT NULL AND next_index > ledger_index + 1
            ORDER BY ledger_index
            "#,
        )
        .bind(floor)
        .persistent(true)
        .fetch_all(&self.pool)
        .await
    }
}
