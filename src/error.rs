use anyhow::Error as ANYHOW_ERROR;
use bigdecimal::ParseBigDecimalError as BIG_DECIMAL_ERROR;
use reqwest::Error as REQWEST_ERROR;
use serde_json::Error as JSON_ERROR;
use sqlx::error::Error as SQL_ERROR;
use std::num::TryFromIntError as TRY_FROM_INT_ERROR;
use std::{
    io::Error as IO_ERROR, num::ParseIntError,
    str::ParseBoolError as PARSE_BOOL_ERROR,
};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WS_ERROR;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use url::ParseError as URL_ERROR;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    URL(#[from] URL_ERROR),

    #[error("{0}")]
    INT(#[from] ParseIntError),

    #[error("{0}")]
    SQL(#[from] SQL_ERROR),

    #[error("{0}")]
    WS(#[from] WS_ERROR),

    #[error("{0}")]
    Reqwest(#[from] REQWEST_ERROR),

    #[error("{0}")]
    BigDecimalError(#[from] BIG_DECIMAL_ERROR),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("{0}")]
    ParseBoolError(#[from] PARSE_BOOL_ERROR),

    #[error("{0}")]
    TryFromIntError(#[from] TRY_FROM_INT_ERROR),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("{0}")]
    AnyHowError(#[from] ANYHOW_ERROR),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Field not exists: {0}")]
    FieldNotExist(String),

    #[error("Invalid field {0}: {1}")]
    InvalidField(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("base amount cannot be zero")]
    ZeroBaseAmount,

    #[error("not an OfferCancel transaction")]
    NotOfferCancel,

    #[error("no active offer found for account={account} sequence={sequence}")]
    NoActiveOffer { account: String, sequence: i64 },

    #[error("failed to connect: {0}")]
    ConnectError(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("client closed")]
    ClientClosed,

    #[error("subscribe error: {error} - {message}")]
    SubscribeError { error: String, message: String },

    #[error("read error (abnormal close: {abnormal}): {message}")]
    ReadError { message: String, abnormal: bool },

    #[error("timeout waiting for ledger {0}")]
    FetchTimeout(u64),

    #[error("ledger {0} was not queued for processing")]
    LedgerDropped(u64),

    #[error("Task message error: {0}")]
    TaskError(String),
}

impl Error {
    /// Errors raised by the stream client; recovered through reconnects.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::WS(_)
                | Error::ConnectError(_)
                | Error::AlreadyConnected
                | Error::NotConnected
                | Error::SubscribeError { .. }
                | Error::ReadError { .. }
                | Error::FetchTimeout(_)
        )
    }
}
