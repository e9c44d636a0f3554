use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LedgerClient, HTTP};
use crate::{dao::LedgerStore, error::Error};

/// Requests ledgers missing from the checkpoint table so they flow through
/// the live pipeline. Ranges are inclusive `(from, to)` pairs.
pub struct Synchronization<S: LedgerStore> {
    store: Arc<S>,
    client: LedgerClient,
    http: HTTP,
    start_ledger: u64,
    max_ledgers: u64,
    running: AtomicBool,
}

impl<S: LedgerStore> Synchronization<S> {
    pub fn new(
        store: Arc<S>,
        client: LedgerClient,
        http: HTTP,
        start_ledger: u64,
        max_ledgers: u64,
    ) -> Self {
        Self {
            store,
            client,
            http,
            start_ledger,
            max_ledgers,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claims the running flag; `false` if a backfill already holds it.
    fn try_start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst)
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<u64, Error> {
        if self.max_ledgers == 0 {
            return Ok(0);
        }

        let info = self.http.get_server_info().await?;
        let Some(validated_seq) = info.validated_seq() else {
            warn!(
                "Node has no validated ledger (state {}), skipping backfill",
                info.server_state
            );
            return Ok(0);
        };

        self.backfill(validated_seq, cancel).await
    }

    pub async fn backfill(
        &self,
        validated_seq: u64,
        cancel: CancellationToken,
    ) -> Result<u64, Error> {
        if !self.try_start() {
            debug!("Backfill already running");
            return Ok(0);
        }

        let result = self.fetch_missing(validated_seq, cancel).await;
        self.set_running(false);

        result
    }

    async fn fetch_missing(
        &self,
        validated_seq: u64,
        cancel: CancellationToken,
    ) -> Result<u64, Error> {
        let parts = self.get_params(validated_seq).await?;
        let total: u64 = parts.iter().map(|(from, to)| to - from + 1).sum();
        if total == 0 {
            info!("No missing ledgers up to {}", validated_seq);
            return Ok(0);
        }

        info!("Backfilling {} ledgers in {} ranges", total, parts.len());

        let mut fetched = 0;
        'parts: for (from, to) in parts {
            for ledger_index in from..=to {
                if cancel.is_cancelled() {
                    break 'parts;
                }
                match self.client.fetch_ledger_sync(ledger_index).await {
                    Ok(_) => fetched += 1,
                    Err(e) => {
                        warn!("Backfill of ledger {} failed: {}", ledger_index, e)
                    },
                }
            }
        }

        info!("✓ Backfill fetched {}/{} ledgers", fetched, total);

        Ok(fetched)
    }

    pub async fn get_params(
        &self,
        validated_seq: u64,
    ) -> Result<Vec<(u64, u64)>, Error> {
        let floor = i64::try_from(self.start_ledger)?;
        let gaps = self.store.get_checkpoint_gaps(floor).await?;
        let last = self
            .store
            .get_last_checkpoint()
            .await?
            .map(|checkpoint| u64::try_from(checkpoint.ledger_index))
            .transpose()?;

        let mut parts: Vec<(u64, u64)> = Vec::new();
        for (begin, end) in gaps {
            parts.push((u64::try_from(begin)? + 1, u64::try_from(end)? - 1));
        }

        let resume = match last {
            Some(last) => Some((last + 1).max(self.start_ledger)),
            None if self.start_ledger > 0 => Some(self.start_ledger),
            None => None,
        };
        if let Some(resume) = resume {
            if resume <= validated_seq {
                parts.push((resume, validated_seq));
            }
        }

        Ok(cap_ranges(parts, self.max_ledgers))
    }
}

/// Keeps the oldest `max_ledgers` ledgers of the given ranges.
fn cap_ranges(parts: Vec<(u64, u64)>, max_ledgers: u64) -> Vec<(u64, u64)> {
    let mut remaining = max_ledgers;
    let mut capped = Vec::with_capacity(parts.len());

    for (from, to) in parts {
        if remaining == 0 {
            warn!("Backfill cap of {} ledgers reached", max_ledgers);
            break;
        }
        let count = to - from + 1;
        if count > remaining {
            capped.push((from, from + remaining - 1));
            remaining = 0;
        } else {
            capped.push((from, to));
            remaining -= count;
        }
    }

    capped
}
