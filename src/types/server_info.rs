use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ServerInfoRpcRequest {
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Default for ServerInfoRpcRequest {
    fn default() -> Self {
        Self {
            method: "server_info",
            params: vec![],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerInfoBody {
    pub result: ServerInfoResult,
}

#[derive(Debug, Deserialize)]
pub struct ServerInfoResult {
    pub info: ServerInfo,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub complete_ledgers: String,
    #[serde(default)]
    pub validated_ledger: Option<ValidatedLedger>,
    #[serde(default)]
    pub server_state: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidatedLedger {
    pub seq: u64,
}

impl ServerInfo {
    pub fn validated_seq(&self) -> Option<u64> {
        self.validated_ledger.as_ref().map(|ledger| ledger.seq)
    }
}
