use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use serde_json::{json, Value};

use crate::{
    error::Error,
    helpers::{json_integer, OfferSide, OfferStatus, TransactionType},
    model::OB_Offer,
    types::{parse_amount, RawTransaction},
};

pub const UNKNOWN_ASSET: &str = "UNKNOWN";
pub const PRICE_SCALE: i64 = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct OrderbookParser;

impl OrderbookParser {
    pub fn new() -> Self {
        OrderbookParser
    }

    /// `Ok(None)` for anything but `OfferCreate`; cancellations go through
    /// [`OrderbookParser::parse_offer_cancel`].
    pub fn parse_transaction(
        &self,
        tx: &RawTransaction,
        ledger_index: u64,
        ledger_hash: &str,
    ) -> Result<Option<OB_Offer>, Error> {
        let tx_type = tx
            .transaction_type()
            .ok_or_else(|| Error::FieldNotExist(String::from("TransactionType")))?;

        match TransactionType::from_str(tx_type) {
            Ok(TransactionType::OfferCreate) => self
                .parse_offer_create(tx, i64::try_from(ledger_index)?, ledger_hash)
                .map(Some),
            _ => Ok(None),
        }
    }

    pub fn parse_offer_cancel(
        &self,
        tx: &RawTransaction,
    ) -> Result<(String, i64), Error> {
        if tx.transaction_type() != Some(TransactionType::OfferCancel.as_str()) {
            return Err(Error::NotOfferCancel);
        }

        let account = tx
            .account()
            .ok_or_else(|| Error::FieldNotExist(String::from("Account")))?;

        let sequence = tx
            .get("OfferSequence")
            .ok_or_else(|| Error::FieldNotExist(String::from("OfferSequence")))?;
        let sequence = coerce_sequence("OfferSequence", sequence)?;

        Ok((account.to_owned(), sequence))
    }

    fn parse_offer_create(
        &self,
        tx: &RawTransaction,
        ledger_index: i64,
        ledger_hash: &str,
    ) -> Result<OB_Offer, Error> {
        let account = tx.account();
        let sequence = tx.get("Sequence").and_then(json_integer);

        let (account, sequence) = match (account, sequence) {
            (Some(account), Some(sequence)) => (account, sequence),
            (None, _) => {
                return Ok(invalid_offer(
                    tx,
                    InvalidIdentity::Unknown { account, sequence },
                    "missing Account field",
                    ledger_index,
                    ledger_hash,
                ))
            },
            (Some(_), None) => {
                return Ok(invalid_offer(
                    tx,
                    InvalidIdentity::Unknown { account, sequence },
                    "missing or invalid Sequence field",
                    ledger_index,
                    ledger_hash,
                ))
            },
        };

        let identity = InvalidIdentity::Known { account, sequence };
        let (taker_pays, taker_gets) = match (tx.get("TakerPays"), tx.get("TakerGets")) {
            (Some(pays), Some(gets)) => (pays, gets),
            (None, _) => {
                return Ok(invalid_offer(
                    tx,
                    identity,
                    "missing TakerPays field",
                    ledger_index,
                    ledger_hash,
                ))
            },
            (_, None) => {
                return Ok(invalid_offer(
                    tx,
                    identity,
                    "missing TakerGets field",
                    ledger_index,
                    ledger_hash,
                ))
            },
        };

        let pays = parse_amount(taker_pays).map_err(|e| {
            Error::InvalidField(String::from("TakerPays"), e.to_string())
        })?;
        let gets = parse_amount(taker_gets).map_err(|e| {
            Error::InvalidField(String::from("TakerGets"), e.to_string())
        })?;

        // The maker sells TakerGets for TakerPays: base = gets, quote = pays.
        let price = calculate_price(&pays.value, &gets.value)?;

        Ok(OB_Offer {
            base_asset: gets.asset,
            quote_asset: pays.asset,
            side: OfferSide::Ask.into(),
            price,
            amount: gets.value,
            offer_sequence: sequence,
            owner_account: account.to_owned(),
            expiration: tx.get("Expiration").and_then(json_integer),
            quality: tx.get_str("Quality").map(str::to_owned),
            ledger_index,
            ledger_hash: ledger_hash.to_owned(),
            status: OfferStatus::Active.into(),
            meta: None,
        })
    }
}

enum InvalidIdentity<'a> {
    Known { account: &'a str, sequence: i64 },
    Unknown { account: Option<&'a str>, sequence: Option<i64> },
}

/// Sentinel row for an `OfferCreate` that could not be fully parsed.
/// The raw event is kept in `meta` whenever the identity is incomplete.
fn invalid_offer(
    tx: &RawTransaction,
    identity: InvalidIdentity,
    reason: &str,
    ledger_index: i64,
    ledger_hash: &str,
) -> OB_Offer {
    let (account, sequence, meta) = match identity {
        InvalidIdentity::Known { account, sequence } => {
            (account, sequence, json!({ "error": reason }))
        },
        InvalidIdentity::Unknown { account, sequence } => (
            account.unwrap_or(UNKNOWN_ASSET),
            sequence.unwrap_or(0),
            json!({ "error": reason, "raw": tx.to_value() }),
        ),
    };

    OB_Offer {
        base_asset: UNKNOWN_ASSET.to_string(),
        quote_asset: UNKNOWN_ASSET.to_string(),
        side: OfferSide::Ask.into(),
        price: String::from("1"),
        amount: String::from("1"),
        offer_sequence: sequence,
        owner_account: account.to_owned(),
        expiration: None,
        quality: None,
        ledger_index,
        ledger_hash: ledger_hash.to_owned(),
        status: OfferStatus::InvalidParse.into(),
        meta: Some(meta),
    }
}

/// `quote / base`, rounded half-even to exactly eight fractional digits.
pub fn calculate_price(quote_amount: &str, base_amount: &str) -> Result<String, Error> {
    let quote = BigDecimal::from_str(quote_amount)?;
    let base = BigDecimal::from_str(base_amount)?;

    if base == BigDecimal::from(0) {
        return Err(Error::ZeroBaseAmount);
    }

    let price = (quote / base).with_scale_round(PRICE_SCALE, RoundingMode::HalfEven);

    Ok(price.to_plain_string())
}

/// Sequence numbers arrive as floats, signed or unsigned integers depending
/// on the decoder upstream; all integral encodings normalize to `i64`.
pub fn coerce_sequence(field: &str, value: &Value) -> Result<i64, Error> {
    json_integer(value).ok_or_else(|| {
        Error::InvalidField(field.to_owned(), format!("invalid {} type", field))
    })
}

pub fn offer_error(offer: &OB_Offer) -> Option<&str> {
    offer
        .meta
        .as_ref()
        .and_then(|meta| meta.get("error"))
        .and_then(Value::as_str)
}
