pub use self::{
    database::DatabasePool,
    event::{
        ClientConfig, ConnectionState, LedgerClient, LedgerStream,
        ObserverGuard, OverflowPolicy,
    },
    http::HTTP,
    synchronization::Synchronization,
};

mod database;
mod event;
mod http;
mod synchronization;
