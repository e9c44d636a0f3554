use std::{sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    amm::AmmParser,
    orderbook::{offer_error, OrderbookParser},
};
use crate::{
    dao::LedgerStore,
    error::Error,
    helpers::{ripple_time_to_utc, OfferStatus, TransactionType},
    model::Ledger_Checkpoint,
    provider::LedgerStream,
    types::{Ledger, RawTransaction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed { transactions: usize, duration_ms: i32 },
    AlreadyProcessed,
    BelowFloor,
}

/// Applies ledgers to the store one at a time and records a checkpoint for
/// each. Re-delivered ledgers are short-circuited by the checkpoint lookup.
pub struct LedgerProcessor<S: LedgerStore> {
    store: Arc<S>,
    amm: AmmParser,
    orderbook: OrderbookParser,
    start_ledger: u64,
}

impl<S: LedgerStore> LedgerProcessor<S> {
    pub fn new(store: Arc<S>, start_ledger: u64) -> Self {
        Self {
            store,
            amm: AmmParser::new(),
            orderbook: OrderbookParser::new(),
            start_ledger,
        }
    }

    pub async fn run(
        &self,
        mut stream: LedgerStream,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutting down ledger processor");
                    break;
                },
                ledger = stream.ledgers.recv() => {
                    let Some(ledger) = ledger else {
                        info!("Ledger channel closed");
                        break;
                    };
                    if let Err(e) = self.process_ledger(&ledger).await {
                        error!(
                            "Error processing ledger {}: {}",
                            ledger.ledger_index, e
                        );
                    }
                },
                Some(e) = stream.errors.recv() => {
                    if e.is_connectivity() {
                        warn!("Stream error: {}", e);
                    } else {
                        error!("Stream error: {}", e);
                    }
                },
            }
        }

        Ok(())
    }

    pub async fn process_ledger(
        &self,
        ledger: &Ledger,
    ) -> Result<ProcessOutcome, Error> {
        let started = Instant::now();

        if ledger.ledger_index < self.start_ledger {
            debug!(
                "Ledger {} below start ledger {}, skipping",
                ledger.ledger_index, self.start_ledger
            );
            return Ok(ProcessOutcome::BelowFloor);
        }

        let ledger_index = i64::try_from(ledger.ledger_index)?;

        match self.store.get_checkpoint(ledger_index).await {
            Ok(Some(_)) => {
                debug!("Ledger {} already processed, skipping", ledger_index);
                return Ok(ProcessOutcome::AlreadyProcessed);
            },
            Ok(None) => {},
            Err(e) => warn!(
                "Checkpoint lookup for ledger {} failed, processing anyway: {}",
                ledger_index, e
            ),
        }

        if ledger_index > 0 {
            match self.store.get_checkpoint(ledger_index - 1).await {
                Ok(Some(_)) => debug!(
                    "Sequential order confirmed: {} -> {}",
                    ledger_index - 1,
                    ledger_index
                ),
                Ok(None) => {},
                Err(e) => warn!(
                    "Continuity check for ledger {} failed: {}",
                    ledger_index, e
                ),
            }
        }

        info!(
            "Processing ledger {} ({} transactions)",
            ledger_index,
            ledger.transactions.len()
        );

        for tx in &ledger.transactions {
            self.process_transaction(tx, ledger).await;
        }

        let duration_ms =
            i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);
        let close_time = i64::try_from(ledger.close_time)?;
        let close_time_human =
            ripple_time_to_utc(close_time).ok_or_else(|| {
                Error::InvalidField(
                    String::from("close_time"),
                    close_time.to_string(),
                )
            })?;

        let checkpoint = Ledger_Checkpoint {
            ledger_index,
            ledger_hash: ledger.ledger_hash.clone(),
            parent_hash: ledger.parent_hash.clone(),
            close_time,
            close_time_human,
            transaction_count: i32::try_from(ledger.transactions.len())?,
            processing_duration_ms: duration_ms,
        };
        self.store.save_checkpoint(&checkpoint).await?;

        info!("✓ Ledger {} processed in {}ms", ledger_index, duration_ms);

        Ok(ProcessOutcome::Processed {
            transactions: ledger.transactions.len(),
            duration_ms,
        })
    }

    async fn process_transaction(&self, tx: &RawTransaction, ledger: &Ledger) {
        let ledger_index = ledger.ledger_index;
        let ledger_hash = ledger.ledger_hash.as_str();

        debug!(
            "Transaction {} type={}",
            tx.hash(),
            tx.transaction_type().unwrap_or("unknown")
        );

        match self.amm.parse_transaction(tx, ledger_index, ledger_hash) {
            Ok(Some(pool)) => match self.store.upsert_amm_pool(&pool).await {
                Ok(_) => info!(
                    "✓ AMM pool updated: {} ({}/{})",
                    pool.account, pool.asset1, pool.asset2
                ),
                Err(e) => error!("Failed to upsert AMM pool {}: {}", pool.account, e),
            },
            Ok(None) => {},
            Err(e) => error!("AMM parse error in tx {}: {}", tx.hash(), e),
        }

        match self.orderbook.parse_transaction(tx, ledger_index, ledger_hash) {
            Ok(Some(offer)) => match self.store.upsert_offer(&offer).await {
                Ok(_) if offer.status == OfferStatus::InvalidParse.to_string() => {
                    debug!(
                        "Stored invalid offer {}:{} ({})",
                        offer.owner_account,
                        offer.offer_sequence,
                        offer_error(&offer).unwrap_or("unknown")
                    )
                },
                Ok(_) => info!(
                    "✓ Offer created: {}:{} {} {}/{} @ {}",
                    offer.owner_account,
                    offer.offer_sequence,
                    offer.amount,
                    offer.base_asset,
                    offer.quote_asset,
                    offer.price
                ),
                Err(e) => error!(
                    "Failed to upsert offer {}:{}: {}",
                    offer.owner_account, offer.offer_sequence, e
                ),
            },
            Ok(None) => {},
            Err(e) => error!("Orderbook parse error in tx {}: {}", tx.hash(), e),
        }

        if tx.transaction_type() == Some(TransactionType::OfferCancel.as_str()) {
            if let Err(e) = self.cancel_offer(tx, ledger_index).await {
                error!("Offer cancel failed in tx {}: {}", tx.hash(), e);
            }
        }
    }

    async fn cancel_offer(
        &self,
        tx: &RawTransaction,
        ledger_index: u64,
    ) -> Result<(), Error> {
        let (account, sequence) = self.orderbook.parse_offer_cancel(tx)?;
        self.store
            .cancel_offer(&account, sequence, i64::try_from(ledger_index)?)
            .await?;
        info!("✓ Offer cancelled: {}:{}", account, sequence);

        Ok(())
    }
}
