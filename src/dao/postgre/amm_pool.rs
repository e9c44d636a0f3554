use sqlx::Error;

use crate::model::{Table, AMM_Pool};

impl Table<AMM_Pool> {
    pub async fn upsert(&self, pool: &AMM_Pool) -> Result<i64, Error> {
        let (id,) = sqlx::query_as(
            r#"
            INSERT INTO core.amm_pools (
                asset1,
                asset2,
                account,
                lp_token,
                asset1_reserve,
                asset2_reserve,
                trading_fee,
                ledger_index,
                ledger_hash
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (account)
            DO UPDATE SET
                asset1_reserve = EXCLUDED.asset1_reserve,
                asset2_reserve = EXCLUDED.asset2_reserve,
                trading_fee = EXCLUDED.trading_fee,
                ledger_index = EXCLUDED.ledger_index,
                ledger_hash = EXCLUDED.ledger_hash,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(&pool.asset1)
        .bind(&pool.asset2)
        .bind(&pool.account)
        .bind(&pool.lp_token)
        .bind(&pool.asset1_reserve)
        .bind(&pool.asset2_reserve)
        .bind(pool.trading_fee)
        .bind(pool.ledger_index)
        .bind(&pool.ledger_hash)
        .persistent(true)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
