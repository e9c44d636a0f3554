use std::{fmt, io, str::FromStr};

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Seconds between the Unix epoch and the ledger network epoch
/// (2000-01-01T00:00:00Z).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

pub fn ripple_time_to_utc(close_time: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(close_time + RIPPLE_EPOCH_OFFSET, 0)
}

/// Integral JSON number in any of its encodings (float, signed, unsigned)
/// as `i64`. Fractional or out-of-range values are rejected.
pub fn json_integer(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(number) => number,
        _ => return None,
    };

    if let Some(n) = number.as_i64() {
        return Some(n);
    }

    if number.is_u64() {
        return None;
    }

    let float = number.as_f64()?;
    if float.is_finite()
        && float.fract() == 0.0
        && float >= i64::MIN as f64
        && float < i64::MAX as f64
    {
        return Some(float as i64);
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    AMMCreate,
    AMMDeposit,
    AMMWithdraw,
    OfferCreate,
    OfferCancel,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::AMMCreate => "AMMCreate",
            TransactionType::AMMDeposit => "AMMDeposit",
            TransactionType::AMMWithdraw => "AMMWithdraw",
            TransactionType::OfferCreate => "OfferCreate",
            TransactionType::OfferCancel => "OfferCancel",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<TransactionType, Self::Err> {
        match value {
            "AMMCreate" => Ok(TransactionType::AMMCreate),
            "AMMDeposit" => Ok(TransactionType::AMMDeposit),
            "AMMWithdraw" => Ok(TransactionType::AMMWithdraw),
            "OfferCreate" => Ok(TransactionType::OfferCreate),
            "OfferCancel" => Ok(TransactionType::OfferCancel),
            _ => Err(io::Error::other("Transaction Type not supported")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    Active,
    Cancelled,
    Filled,
    Expired,
    InvalidParse,
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OfferStatus::Active => write!(f, "active"),
            OfferStatus::Cancelled => write!(f, "cancelled"),
            OfferStatus::Filled => write!(f, "filled"),
            OfferStatus::Expired => write!(f, "expired"),
            OfferStatus::InvalidParse => write!(f, "invalid_parse"),
        }
    }
}

impl From<OfferStatus> for String {
    fn from(value: OfferStatus) -> Self {
        value.to_string()
    }
}

impl FromStr for OfferStatus {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<OfferStatus, Self::Err> {
        match value {
            "active" => Ok(OfferStatus::Active),
            "cancelled" => Ok(OfferStatus::Cancelled),
            "filled" => Ok(OfferStatus::Filled),
            "expired" => Ok(OfferStatus::Expired),
            "invalid_parse" => Ok(OfferStatus::InvalidParse),
            _ => Err(io::Error::other("Offer Status not supported")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferSide {
    Bid,
    Ask,
}

impl fmt::Display for OfferSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OfferSide::Bid => write!(f, "bid"),
            OfferSide::Ask => write!(f, "ask"),
        }
    }
}

impl From<OfferSide> for String {
    fn from(value: OfferSide) -> Self {
        value.to_string()
    }
}
