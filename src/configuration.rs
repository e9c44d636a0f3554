use std::{env, fs, io::ErrorKind, str::FromStr};

use url::Url;

use crate::{error::Error, provider::OverflowPolicy};

pub const DEFAULT_RIPPLED_WS: &str = "ws://localhost:6006";
pub const DEFAULT_RIPPLED_RPC: &str = "http://localhost:5005";

#[derive(Debug, Clone)]
pub struct Config {
    pub rippled_ws: String,
    pub rippled_rpc: String,
    pub database_url: String,
    pub start_ledger: u64,
    pub verbose: bool,
    pub ledger_buffer: usize,
    pub error_buffer: usize,
    pub socket_reconnect_interval: u64,
    pub socket_max_retries: Option<u32>,
    pub fetch_timeout: u64,
    pub handshake_timeout: u64,
    pub ledger_overflow_policy: OverflowPolicy,
    pub database_max_connections: u32,
    pub backfill_max_ledgers: u64,
}

impl Config {
    /// Builds the configuration from a variable lookup; unset or empty
    /// variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        let database_url = var("DATABASE_URL", "");
        if database_url.is_empty() {
            return Err(Error::ConfigurationError(String::from(
                "DATABASE_URL environment variable or --db flag is required",
            )));
        }

        let rippled_ws = var("RIPPLED_WS", DEFAULT_RIPPLED_WS);
        let scheme = Url::parse(&rippled_ws)?.scheme().to_owned();
        if scheme != "ws" && scheme != "wss" {
            return Err(Error::ConfigurationError(format!(
                "RIPPLED_WS must be a ws:// or wss:// URL, got {}",
                rippled_ws
            )));
        }

        let socket_max_retries: i64 = var("SOCKET_MAX_RETRIES", "-1").parse()?;
        let socket_max_retries = if socket_max_retries < 0 {
            None
        } else {
            Some(u32::try_from(socket_max_retries)?)
        };

        Ok(Config {
            rippled_ws,
            rippled_rpc: var("RIPPLED_RPC", DEFAULT_RIPPLED_RPC),
            database_url,
            start_ledger: var("START_LEDGER", "0").parse()?,
            verbose: var("VERBOSE", "false").parse()?,
            ledger_buffer: var("LEDGER_BUFFER", "100").parse()?,
            error_buffer: var("ERROR_BUFFER", "10").parse()?,
            socket_reconnect_interval: var("SOCKET_RECONNECT_INTERVAL", "5")
                .parse()?,
            socket_max_retries,
            fetch_timeout: var("FETCH_TIMEOUT", "10").parse()?,
            handshake_timeout: var("HANDSHAKE_TIMEOUT", "10").parse()?,
            ledger_overflow_policy: OverflowPolicy::from_str(&var(
                "LEDGER_OVERFLOW_POLICY",
                "drop_newest",
            ))?,
            database_max_connections: var("DATABASE_MAX_CONNECTIONS", "10")
                .parse()?,
            backfill_max_ledgers: var("BACKFILL_MAX_LEDGERS", "0").parse()?,
        })
    }
}

pub fn get_configuration() -> Result<Config, Error> {
    Config::from_lookup(|key| env::var(key).ok())
}

/// Loads `.env` from the working directory into the process environment.
/// A missing file is not an error; variables already set are kept.
pub fn set_configuration() -> Result<(), Error> {
    let config_string = match fs::read_to_string(".env") {
        Ok(config_string) => config_string,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Io(e)),
    };

    for (key, value) in parse_config_string(&config_string) {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }

    Ok(())
}

fn parse_config_string(config: &str) -> Vec<(String, String)> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim().to_owned(), value.to_owned()))
        })
        .collect()
}
