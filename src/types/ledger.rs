use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A validated ledger as delivered by the stream client.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub ledger_index: u64,
    pub ledger_hash: String,
    pub parent_hash: Option<String>,
    /// Seconds since the network epoch (2000-01-01T00:00:00Z).
    pub close_time: u64,
    pub validated: bool,
    pub transactions: Vec<RawTransaction>,
    pub txn_count: usize,
}

/// Loosely typed transaction record; parsers probe its fields by name.
///
/// Transactions in the API v2 shape (`tx_json` + `meta` + `hash`) are
/// flattened so the transaction fields sit at the top level next to
/// `hash` and `meta`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct RawTransaction(Map<String, Value>);

impl RawTransaction {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn transaction_type(&self) -> Option<&str> {
        self.get_str("TransactionType")
    }

    pub fn account(&self) -> Option<&str> {
        self.get_str("Account")
    }

    pub fn hash(&self) -> &str {
        self.get_str("hash").unwrap_or("")
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for RawTransaction {
    fn from(mut map: Map<String, Value>) -> Self {
        if let Some(Value::Object(tx_json)) = map.remove("tx_json") {
            for (key, value) in tx_json {
                map.entry(key).or_insert(value);
            }
        }

        RawTransaction(map)
    }
}

impl From<Value> for RawTransaction {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawTransaction::from(map),
            _ => RawTransaction::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexValue {
    Number(u64),
    Text(String),
}

/// The node reports ledger indices both as numbers and as numeric strings.
pub(crate) fn deserialize_opt_index<'de, D>(
    deserializer: D,
) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<IndexValue>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(IndexValue::Number(n)) => Ok(Some(n)),
        Some(IndexValue::Text(s)) => {
            s.parse::<u64>().map(Some).map_err(serde::de::Error::custom)
        },
    }
}
