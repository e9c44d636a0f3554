//! Command-line interface
//!
//! Flags override the matching environment variables; everything else is
//! read from the environment (and an optional `.env` file).

use std::env;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    configuration::{set_configuration, Config},
    error::Error,
    migration,
    provider::HTTP,
};

/// Ledger stream indexer for AMM pools and order book offers
#[derive(Debug, Parser)]
#[command(name = "xrpl-etl")]
#[command(about = "Ledger stream indexer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Ledger node WebSocket URL [env: RIPPLED_WS]
    #[arg(long, global = true)]
    pub rippled_ws: Option<String>,

    /// Ledger node JSON-RPC URL [env: RIPPLED_RPC]
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// PostgreSQL connection string [env: DATABASE_URL]
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Earliest ledger to index [env: START_LEDGER]
    #[arg(long, global = true)]
    pub start_ledger: Option<u64>,

    /// Per-transaction logging [env: VERBOSE]
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the indexer (default if no command specified)
    Serve,

    /// Run database migrations
    Migrate {
        /// Mark migrations as applied without running them.
        /// With a version, fakes up to that version and runs the rest.
        #[arg(long)]
        fake: Option<Option<u32>>,
    },

    /// Print the node's server_info over JSON-RPC
    ServerInfo,
}

impl Cli {
    /// Value supplied on the command line for an environment key.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "RIPPLED_WS" => self.rippled_ws.clone(),
            "RIPPLED_RPC" => self.rpc_url.clone(),
            "DATABASE_URL" => self.db.clone(),
            "START_LEDGER" => self.start_ledger.map(|index| index.to_string()),
            "VERBOSE" if self.verbose => Some(String::from("true")),
            _ => None,
        }
    }

    pub fn init_config(&self) -> Result<Config, Error> {
        set_configuration()?;
        Config::from_lookup(|key| {
            self.lookup(key).or_else(|| env::var(key).ok())
        })
    }
}

pub async fn run_migrate(
    config: &Config,
    fake: Option<Option<u32>>,
) -> Result<(), Error> {
    match fake {
        Some(None) => {
            info!("Marking all migrations as applied without running them...");
            migration::run_migrations_fake(&config.database_url, None).await?;
        },
        Some(Some(version)) => {
            info!("Marking migrations up to V{:03} as applied...", version);
            migration::run_migrations_fake(&config.database_url, Some(version))
                .await?;
            migration::run_migrations(&config.database_url).await?;
        },
        None => migration::run_migrations(&config.database_url).await?,
    }

    info!("✓ Migrations complete");

    Ok(())
}

pub async fn run_server_info(config: &Config) -> Result<(), Error> {
    let info = HTTP::new(config.rippled_rpc.as_str()).get_server_info().await?;

    info!("Server state: {}", info.server_state);
    info!("Complete ledgers: {}", info.complete_ledgers);
    match info.validated_seq() {
        Some(seq) => info!("Validated ledger: {}", seq),
        None => info!("Validated ledger: none"),
    }

    Ok(())
}
