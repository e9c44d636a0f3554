pub use self::{
    amount::{format_asset, parse_amount, Amount, NATIVE_ASSET},
    ledger::{Ledger, RawTransaction},
    messages::{
        to_message, InboundMessage, LedgerClosedNotification, LedgerRequest,
        ServerInfoRequest, SubscribeRequest, SubscribeResponse,
    },
    server_info::{ServerInfo, ServerInfoBody, ServerInfoRpcRequest},
};

mod amount;
mod ledger;
mod messages;
mod server_info;
