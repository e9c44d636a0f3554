//! In-memory store with the same upsert semantics as the Postgres tables.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use super::LedgerStore;
use crate::{
    error::Error,
    helpers::OfferStatus,
    model::{Ledger_Checkpoint, AMM_Pool, OB_Offer},
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub pools: Mutex<BTreeMap<String, AMM_Pool>>,
    pub offers: Mutex<BTreeMap<(String, i64), OB_Offer>>,
    pub checkpoints: Mutex<BTreeMap<i64, Ledger_Checkpoint>>,
    pub fail_checkpoints: AtomicBool,
    pub failing_reads: Mutex<BTreeSet<i64>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, account: &str) -> Option<AMM_Pool> {
        self.pools.lock().unwrap().get(account).cloned()
    }

    pub fn offer(&self, account: &str, sequence: i64) -> Option<OB_Offer> {
        self.offers
            .lock()
            .unwrap()
            .get(&(account.to_string(), sequence))
            .cloned()
    }

    pub fn checkpoint(&self, ledger_index: i64) -> Option<Ledger_Checkpoint> {
        self.checkpoints.lock().unwrap().get(&ledger_index).cloned()
    }

    pub fn insert_checkpoint(&self, ledger_index: i64) {
        let checkpoint = Ledger_Checkpoint {
            ledger_index,
            ledger_hash: format!("HASH{}", ledger_index),
            parent_hash: None,
            close_time: 0,
            close_time_human: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0)
                .unwrap(),
            transaction_count: 0,
            processing_duration_ms: 0,
        };
        self.checkpoints
            .lock()
            .unwrap()
            .insert(ledger_index, checkpoint);
    }

    /// Makes `get_checkpoint(ledger_index)` fail.
    pub fn fail_read(&self, ledger_index: i64) {
        self.failing_reads.lock().unwrap().insert(ledger_index);
    }

    fn id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn upsert_amm_pool(&self, pool: &AMM_Pool) -> Result<i64, Error> {
        let mut pools = self.pools.lock().unwrap();
        match pools.get_mut(&pool.account) {
            Some(existing) => {
                existing.asset1_reserve = pool.asset1_reserve.clone();
                existing.asset2_reserve = pool.asset2_reserve.clone();
                existing.trading_fee = pool.trading_fee;
                existing.ledger_index = pool.ledger_index;
                existing.ledger_hash = pool.ledger_hash.clone();
            },
            None => {
                pools.insert(pool.account.clone(), pool.clone());
            },
        }
        Ok(self.id())
    }

    async fn upsert_offer(&self, offer: &OB_Offer) -> Result<i64, Error> {
        let mut offers = self.offers.lock().unwrap();
        let key = (offer.owner_account.clone(), offer.offer_sequence);
        match offers.get_mut(&key) {
            Some(existing) => {
                existing.price = offer.price.clone();
                existing.amount = offer.amount.clone();
                existing.status = offer.status.clone();
                existing.meta = offer.meta.clone();
                existing.ledger_index = offer.ledger_index;
                existing.ledger_hash = offer.ledger_hash.clone();
            },
            None => {
                offers.insert(key, offer.clone());
            },
        }
        Ok(self.id())
    }

    async fn cancel_offer(
        &self,
        owner_account: &str,
        offer_sequence: i64,
        ledger_index: i64,
    ) -> Result<(), Error> {
        let mut offers = self.offers.lock().unwrap();
        let active = OfferStatus::Active.to_string();
        match offers.get_mut(&(owner_account.to_string(), offer_sequence)) {
            Some(offer) if offer.status == active => {
                offer.status = OfferStatus::Cancelled.to_string();
                offer.ledger_index = ledger_index;
                Ok(())
            },
            _ => Err(Error::NoActiveOffer {
                account: owner_account.to_string(),
                sequence: offer_sequence,
            }),
        }
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &Ledger_Checkpoint,
    ) -> Result<(), Error> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(Error::TaskError(String::from("checkpoint store down")));
        }
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.ledger_index, checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(
        &self,
        ledger_index: i64,
    ) -> Result<Option<Ledger_Checkpoint>, Error> {
        if self.failing_reads.lock().unwrap().contains(&ledger_index) {
            return Err(Error::TaskError(String::from("transient read")));
        }
        Ok(self.checkpoint(ledger_index))
    }

    async fn get_last_checkpoint(
        &self,
    ) -> Result<Option<Ledger_Checkpoint>, Error> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap()
            .values()
            .next_back()
            .cloned())
    }

    async fn get_checkpoint_gaps(
        &self,
        floor: i64,
    ) -> Result<Vec<(i64, i64)>, Error> {
        let checkpoints = self.checkpoints.lock().unwrap();
        let indices: Vec<i64> =
            checkpoints.keys().copied().filter(|i| *i >= floor).collect();

        Ok(indices
            .windows(2)
            .filter(|pair| pair[1] > pair[0] + 1)
            .map(|pair| (pair[0], pair[1]))
            .collect())
    }
}
