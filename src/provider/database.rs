use async_trait::async_trait;
use tracing::info;

use crate::{
    configuration::Config,
    dao::{LedgerStore, PoolOption, PoolType},
    error::Error,
    model::{Ledger_Checkpoint, Table, AMM_Pool, OB_Offer},
};

#[derive(Debug)]
pub struct DatabasePool {
    pub amm_pool: Table<AMM_Pool>,
    pub offer: Table<OB_Offer>,
    pub checkpoint: Table<Ledger_Checkpoint>,
    pub pool: PoolType,
}

impl DatabasePool {
    pub async fn new(config: &Config) -> Result<DatabasePool, Error> {
        let pool = PoolOption::new()
            .max_connections(config.database_max_connections)
            .connect(config.database_url.as_str())
            .await?;

        info!("✓ Connected to database");

        Ok(DatabasePool {
            amm_pool: Table::new(pool.clone()),
            offer: Table::new(pool.clone()),
            checkpoint: Table::new(pool.clone()),
            pool,
        })
    }
}

#[async_trait]
impl LedgerStore for DatabasePool {
    async fn upsert_amm_pool(&self, pool: &AMM_Pool) -> Result<i64, Error> {
        Ok(self.amm_pool.upsert(pool).await?)
    }

    async fn upsert_offer(&self, offer: &OB_Offer) -> Result<i64, Error> {
        Ok(self.offer.upsert(offer).await?)
    }

    async fn cancel_offer(
        &self,
        owner_account: &str,
        offer_sequence: i64,
        ledger_index: i64,
    ) -> Result<(), Error> {
        let rows = self
            .offer
            .cancel(owner_account, offer_sequence, ledger_index)
            .await?;

        if rows == 0 {
            return Err(Error::NoActiveOffer {
                account: owner_account.to_owned(),
                sequence: offer_sequence,
            });
        }

        Ok(())
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &Ledger_Checkpoint,
    ) -> Result<(), Error> {
        self.checkpoint.upsert(checkpoint).await?;
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        ledger_index: i64,
    ) -> Result<Option<Ledger_Checkpoint>, Error> {
        Ok(self.checkpoint.get_one(ledger_index).await?)
    }

    async fn get_last_checkpoint(
        &self,
    ) -> Result<Option<Ledger_Checkpoint>, Error> {
        Ok(self.checkpoint.get_last().await?)
    }

    async fn get_checkpoint_gaps(
        &self,
        floor: i64,
    ) -> Result<Vec<(i64, i64)>, Error> {
        Ok(self.checkpoint.get_missing(floor).await?)
    }
}
