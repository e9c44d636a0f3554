pub use self::types::{PoolOption, PoolType, QueryResult};

mod amm_pool;
mod ledger_checkpoint;
mod offer;
mod types;
