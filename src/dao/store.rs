use async_trait::async_trait;

use crate::{
    error::Error,
    model::{Ledger_Checkpoint, AMM_Pool, OB_Offer},
};

/// Write-through contract the ledger pipeline needs from persistent
/// storage. Every write is an upsert on the natural key, so replaying a
/// ledger converges to the same state.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Conflict key: operating account.
    async fn upsert_amm_pool(&self, pool: &AMM_Pool) -> Result<i64, Error>;

    /// Conflict key: (owner account, offer sequence).
    async fn upsert_offer(&self, offer: &OB_Offer) -> Result<i64, Error>;

    /// Moves an `active` offer to `cancelled`. Fails with
    /// [`Error::NoActiveOffer`] when nothing matched.
    async fn cancel_offer(
        &self,
        owner_account: &str,
        offer_sequence: i64,
        ledger_index: i64,
    ) -> Result<(), Error>;

    /// Conflict key: ledger index; full overwrite.
    async fn save_checkpoint(
        &self,
        checkpoint: &Ledger_Checkpoint,
    ) -> Result<(), Error>;

    async fn get_checkpoint(
        &self,
        ledger_index: i64,
    ) -> Result<Option<Ledger_Checkpoint>, Error>;

    async fn get_last_checkpoint(
        &self,
    ) -> Result<Option<Ledger_Checkpoint>, Error>;

    /// Exclusive `(gap_begin, gap_end)` holes in the checkpoint sequence at
    /// or above `floor`.
    async fn get_checkpoint_gaps(
        &self,
        floor: i64,
    ) -> Result<Vec<(i64, i64)>, Error>;
}
