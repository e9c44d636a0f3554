mod postgre;
mod store;

#[cfg(test)]
pub mod memory;

pub use postgre::{PoolOption, PoolType, QueryResult};
pub use store::LedgerStore;
