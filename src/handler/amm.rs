use std::str::FromStr;

use crate::{
    error::Error,
    helpers::{json_integer, TransactionType},
    model::AMM_Pool,
    types::{parse_amount, RawTransaction},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct AmmParser;

impl AmmParser {
    pub fn new() -> Self {
        AmmParser
    }

    /// `Ok(None)` when the transaction is not one this parser applies.
    pub fn parse_transaction(
        &self,
        tx: &RawTransaction,
        ledger_index: u64,
        ledger_hash: &str,
    ) -> Result<Option<AMM_Pool>, Error> {
        let tx_type = tx
            .transaction_type()
            .ok_or_else(|| Error::FieldNotExist(String::from("TransactionType")))?;

        match TransactionType::from_str(tx_type) {
            Ok(TransactionType::AMMCreate) => {
                self.parse_amm_create(tx, ledger_index, ledger_hash).map(Some)
            },
            // TODO: apply reserve deltas from the AMM ledger entry in `meta`
            // once AffectedNodes are decoded.
            Ok(TransactionType::AMMDeposit) | Ok(TransactionType::AMMWithdraw) => {
                Ok(None)
            },
            _ => Ok(None),
        }
    }

    fn parse_amm_create(
        &self,
        tx: &RawTransaction,
        ledger_index: u64,
        ledger_hash: &str,
    ) -> Result<AMM_Pool, Error> {
        let account = tx
            .account()
            .ok_or_else(|| Error::FieldNotExist(String::from("Account")))?;

        let amount = tx
            .get("Amount")
            .ok_or_else(|| Error::FieldNotExist(String::from("Amount")))?;
        let asset1 = parse_amount(amount).map_err(|e| {
            Error::InvalidField(String::from("Amount"), e.to_string())
        })?;

        let amount2 = tx
            .get("Amount2")
            .ok_or_else(|| Error::FieldNotExist(String::from("Amount2")))?;
        let asset2 = parse_amount(amount2).map_err(|e| {
            Error::InvalidField(String::from("Amount2"), e.to_string())
        })?;

        let trading_fee = tx
            .get("TradingFee")
            .and_then(json_integer)
            .map(i32::try_from)
            .transpose()?
            .unwrap_or(0);

        Ok(AMM_Pool {
            lp_token: lp_token_id(&asset1.asset, &asset2.asset),
            asset1: asset1.asset,
            asset2: asset2.asset,
            account: account.to_owned(),
            asset1_reserve: asset1.value,
            asset2_reserve: asset2.value,
            trading_fee,
            ledger_index: i64::try_from(ledger_index)?,
            ledger_hash: ledger_hash.to_owned(),
        })
    }
}

/// Derived from the asset pair; the authoritative LP token currency code
/// lives in the transaction metadata and is not decoded here.
pub fn lp_token_id(asset1: &str, asset2: &str) -> String {
    format!("LP_{}_{}", asset1, asset2)
}
