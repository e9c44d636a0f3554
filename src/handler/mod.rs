pub use self::{
    amm::{lp_token_id, AmmParser},
    ledger::{LedgerProcessor, ProcessOutcome},
    orderbook::{calculate_price, OrderbookParser},
};

mod amm;
mod ledger;
mod orderbook;
