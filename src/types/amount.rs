use serde_json::Value;

use crate::error::Error;

pub const NATIVE_ASSET: &str = "XRP";

/// A parsed ledger amount: asset identifier plus the magnitude exactly as
/// it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub asset: String,
    pub value: String,
}

/// `"XRP"` for the native currency, `"<CODE>.<ISSUER>"` otherwise.
pub fn format_asset(currency: &str, issuer: &str) -> String {
    if currency == NATIVE_ASSET || issuer.is_empty() {
        return NATIVE_ASSET.to_string();
    }

    format!("{}.{}", currency, issuer)
}

/// Native amounts arrive as a bare string of drops, issued amounts as an
/// object with `currency`, `issuer` and `value`. Anything else is rejected.
pub fn parse_amount(amount: &Value) -> Result<Amount, Error> {
    match amount {
        Value::String(drops) => Ok(Amount {
            asset: NATIVE_ASSET.to_string(),
            value: drops.to_owned(),
        }),
        Value::Object(obj) => {
            let currency = obj.get("currency").and_then(Value::as_str);
            let issuer = obj.get("issuer").and_then(Value::as_str);
            let value = obj.get("value").and_then(Value::as_str);

            match (currency, issuer, value) {
                (Some(currency), Some(issuer), Some(value)) => Ok(Amount {
                    asset: format_asset(currency, issuer),
                    value: value.to_owned(),
                }),
                _ => Err(Error::InvalidAmount(String::from(
                    "invalid IOU amount object",
                ))),
            }
        },
        _ => Err(Error::InvalidAmount(String::from("invalid amount type"))),
    }
}
