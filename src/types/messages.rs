//! Wire messages exchanged with the ledger node over the stream
//! connection.
//!
//! Inbound frames carry no reliable type tag, so they are decoded by
//! probing shapes in a fixed priority order (see [`PROBES`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ledger::{deserialize_opt_index, Ledger, RawTransaction};
use crate::{error::Error, helpers::json_integer};

#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub command: &'static str,
    pub streams: Vec<&'static str>,
}

impl SubscribeRequest {
    pub fn ledger_stream() -> Self {
        Self {
            command: "subscribe",
            streams: vec!["ledger"],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerRequest {
    pub command: &'static str,
    pub ledger_index: u64,
    pub transactions: bool,
    pub expand: bool,
}

impl LedgerRequest {
    pub fn full(ledger_index: u64) -> Self {
        Self {
            command: "ledger",
            ledger_index,
            transactions: true,
            expand: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServerInfoRequest {
    pub command: &'static str,
}

impl Default for ServerInfoRequest {
    fn default() -> Self {
        Self {
            command: "server_info",
        }
    }
}

pub fn to_message<T: Serialize>(request: &T) -> Result<String, Error> {
    Ok(serde_json::to_string(request)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerClosedNotification {
    pub ledger_index: u64,
    pub ledger_hash: String,
    pub ledger_time: u64,
    pub fee_base: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscribeResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    LedgerClosed(LedgerClosedNotification),
    LedgerResponse(Ledger),
    SubscribeResponse(SubscribeResponse),
    Unknown,
}

type Probe = fn(&Value) -> Option<InboundMessage>;

/// Shape probes, tried in order; the first match wins.
const PROBES: [Probe; 3] = [
    probe_ledger_closed,
    probe_ledger_response,
    probe_subscribe_response,
];

impl InboundMessage {
    pub fn classify(text: &str) -> InboundMessage {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(_) => return InboundMessage::Unknown,
        };

        PROBES
            .iter()
            .find_map(|probe| probe(&value))
            .unwrap_or(InboundMessage::Unknown)
    }
}

/// Non-zero integral index; fractional numbers are rejected.
fn positive(value: Option<&Value>) -> Option<u64> {
    let number = match value? {
        Value::String(s) => s.parse::<u64>().ok(),
        value => json_integer(value).and_then(|n| u64::try_from(n).ok()),
    };

    number.filter(|n| *n > 0)
}

fn probe_ledger_closed(value: &Value) -> Option<InboundMessage> {
    let obj = value.as_object()?;
    if obj.contains_key("status") {
        return None;
    }

    let ledger_index = positive(obj.get("ledger_index"))?;
    let fee_base = positive(obj.get("fee_base"))?;

    Some(InboundMessage::LedgerClosed(LedgerClosedNotification {
        ledger_index,
        ledger_hash: obj
            .get("ledger_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        ledger_time: obj.get("ledger_time").and_then(Value::as_u64).unwrap_or(0),
        fee_base,
    }))
}

#[derive(Debug, Deserialize)]
struct LedgerCommandResponse {
    status: String,
    result: LedgerCommandResult,
}

#[derive(Debug, Deserialize)]
struct LedgerCommandResult {
    #[serde(default)]
    ledger: Option<LedgerBody>,
    #[serde(default, deserialize_with = "deserialize_opt_index")]
    ledger_index: Option<u64>,
    #[serde(default)]
    ledger_hash: Option<String>,
    #[serde(default)]
    validated: bool,
}

#[derive(Debug, Deserialize)]
struct LedgerBody {
    #[serde(default, deserialize_with = "deserialize_opt_index")]
    ledger_index: Option<u64>,
    #[serde(default)]
    ledger_hash: Option<String>,
    #[serde(default)]
    parent_hash: Option<String>,
    #[serde(default)]
    close_time: u64,
    #[serde(default)]
    validated: bool,
    #[serde(default)]
    transactions: Vec<Value>,
}

fn probe_ledger_response(value: &Value) -> Option<InboundMessage> {
    let response = LedgerCommandResponse::deserialize(value).ok()?;
    if response.status != "success" {
        return None;
    }

    let result = response.result;
    let ledger = result.ledger?;
    if !(result.validated || ledger.validated) {
        return None;
    }

    let ledger_index = result.ledger_index.or(ledger.ledger_index)?;
    let ledger_hash = result.ledger_hash.or(ledger.ledger_hash).unwrap_or_default();

    let transactions: Vec<RawTransaction> = ledger
        .transactions
        .into_iter()
        .filter(Value::is_object)
        .map(RawTransaction::from)
        .collect();

    Some(InboundMessage::LedgerResponse(Ledger {
        ledger_index,
        ledger_hash,
        parent_hash: ledger.parent_hash.filter(|hash| !hash.is_empty()),
        close_time: ledger.close_time,
        validated: true,
        txn_count: transactions.len(),
        transactions,
    }))
}

fn probe_subscribe_response(value: &Value) -> Option<InboundMessage> {
    value.get("status")?.as_str()?;
    SubscribeResponse::deserialize(value)
        .ok()
        .map(InboundMessage::SubscribeResponse)
}
