use sqlx::Error;

use crate::model::{OB_Offer, Table};

impl Table<OB_Offer> {
    pub async fn upsert(&self, offer: &OB_Offer) -> Result<i64, Error> {
        let (id,) = sqlx::query_as(
            r#"
            INSERT INTO core.orderbook_state (
                base_asset,
                quote_asset,
                side,
                price,
                amount,
                offer_sequence,
                owner_account,
                expiration,
                quality,
                ledger_index,
                ledger_hash,
                status,
                meta
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (owner_account, offer_sequence)
            DO UPDATE SET
                price = EXCLUDED.price,
                amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                meta = EXCLUDED.meta,
                ledger_index = EXCLUDED.ledger_index,
                ledger_hash = EXCLUDED.ledger_hash,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(&offer.base_asset)
        .bind(&offer.quote_asset)
        .bind(&offer.side)
        .bind(&offer.price)
        .bind(&offer.amount)
        .bind(offer.offer_sequence)
        .bind(&offer.owner_account)
        .bind(offer.expiration)
        .bind(&offer.quality)
        .bind(offer.ledger_index)
        .bind(&offer.ledger_hash)
        .bind(&offer.status)
        .bind(&offer.meta)
        .persistent(true)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Returns the number of rows moved from `active` to `cancelled`.
    pub async fn cancel(
        &self,
        owner_account: &str,
        offer_sequence: i64,
        ledger_index: i64,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE core.orderbook_state
            SET status = 'cancelled', ledger_index = $3, updated_at = now()
            WHERE owner_account = $1 AND offer_sequence = $2 AND status = 'active'
            "#,
        )
        .bind(owner_account)
        .bind(offer_sequence)
        .bind(ledger_index)
        .persistent(true)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
