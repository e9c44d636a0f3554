//! Database models
//!
//! One struct per table in the `core` schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

// =============================================================================
// AMM DOMAIN
// =============================================================================

/// Keyed by the pool-operating `account`.
#[derive(Debug, Clone, PartialEq, FromRow, Deserialize, Serialize)]
pub struct AMM_Pool {
    pub asset1: String,
    pub asset2: String,
    pub account: String,
    pub lp_token: String,
    pub asset1_reserve: String,
    pub asset2_reserve: String,
    pub trading_fee: i32,
    pub ledger_index: i64,
    pub ledger_hash: String,
}

// =============================================================================
// ORDERBOOK DOMAIN
// =============================================================================

/// Keyed by (`owner_account`, `offer_sequence`).
#[derive(Debug, Clone, PartialEq, FromRow, Deserialize, Serialize)]
pub struct OB_Offer {
    pub base_asset: String,
    pub quote_asset: String,
    pub side: String,
    pub price: String,
    pub amount: String,
    pub offer_sequence: i64,
    pub owner_account: String,
    pub expiration: Option<i64>,
    pub quality: Option<String>,
    pub ledger_index: i64,
    pub ledger_hash: String,
    pub status: String,
    pub meta: Option<Value>,
}

// =============================================================================
// CHECKPOINTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, FromRow, Deserialize, Serialize)]
pub struct Ledger_Checkpoint {
    pub ledger_index: i64,
    pub ledger_hash: String,
    pub parent_hash: Option<String>,
    pub close_time: i64,
    pub close_time_human: DateTime<Utc>,
    pub transaction_count: i32,
    pub processing_duration_ms: i32,
}
