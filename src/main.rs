use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use xrpl_etl::{
    cli::{run_migrate, run_server_info, Cli, Commands},
    configuration::Config,
    dao::LedgerStore,
    error::Error,
    handler::LedgerProcessor,
    migration,
    provider::{ClientConfig, DatabasePool, LedgerClient, Synchronization, HTTP},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = cli.init_config()?;

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Migrate { fake }) => run_migrate(&config, fake).await,
        Some(Commands::ServerInfo) => run_server_info(&config).await,
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<(), Error> {
    info!("Starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Ledger node: {}", config.rippled_ws);

    migration::run_migrations(&config.database_url).await?;
    let store = Arc::new(DatabasePool::new(&config).await?);

    match store.get_last_checkpoint().await? {
        Some(checkpoint) => info!(
            "Resuming from checkpoint at ledger {}",
            checkpoint.ledger_index
        ),
        None => info!("No checkpoint found, starting fresh"),
    }

    let (client, stream) = LedgerClient::new(ClientConfig::from(&config));
    client.connect().await?;
    client.subscribe().await?;

    let cancel = client.cancellation_token();
    tokio::spawn(shutdown_signal(cancel.clone()));

    if config.backfill_max_ledgers > 0 {
        let synchronization = Synchronization::new(
            store.clone(),
            client.clone(),
            HTTP::new(config.rippled_rpc.as_str()),
            config.start_ledger,
            config.backfill_max_ledgers,
        );
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = synchronization.run(cancel).await {
                warn!("Backfill failed: {}", e);
            }
        });
    }

    info!("✓ Indexer running, waiting for ledgers...");

    let processor = LedgerProcessor::new(store, config.start_ledger);
    let result = processor.run(stream, cancel).await;

    client.close().await?;
    info!("Indexer stopped");

    result
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    info!("Received shutdown signal");
    cancel.cancel();
}
