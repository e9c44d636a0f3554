//! Versioned schema migrations for the `core` schema, tracked by refinery
//! in `refinery_schema_history`.

use refinery::{embed_migrations, Report, Target};
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use crate::error::Error;

embed_migrations!("migrations");

async fn connect(database_url: &str) -> Result<Client, Error> {
    let config: tokio_postgres::Config = database_url.parse().map_err(|e| {
        Error::ConfigurationError(format!("Invalid database URL: {}", e))
    })?;

    let (client, connection) = config.connect(NoTls).await.map_err(|e| {
        Error::ConfigurationError(format!(
            "Failed to connect for migrations: {}",
            e
        ))
    })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Migration connection error: {}", e);
        }
    });

    Ok(client)
}

fn log_report(report: &Report, verb: &str) {
    let applied = report.applied_migrations();
    if applied.is_empty() {
        info!("No pending migrations");
        return;
    }

    for migration in applied {
        info!(
            "{}: V{:03}__{} (checksum: {})",
            verb,
            migration.version(),
            migration.name(),
            migration.checksum()
        );
    }
}

/// Applies pending migrations in version order. Each migration runs in its
/// own transaction.
pub async fn run_migrations(database_url: &str) -> Result<(), Error> {
    info!("Running database migrations...");

    let mut client = connect(database_url).await?;
    let report = migrations::runner()
        .run_async(&mut client)
        .await
        .map_err(|e| {
            Error::ConfigurationError(format!("Migration failed: {}", e))
        })?;

    log_report(&report, "Applied migration");

    Ok(())
}

/// Records migrations as applied without executing them, for databases
/// whose schema was created by hand. `None` fakes every migration.
pub async fn run_migrations_fake(
    database_url: &str,
    up_to_version: Option<u32>,
) -> Result<(), Error> {
    let target = match up_to_version {
        None => Target::Fake,
        Some(version) => Target::FakeVersion(version),
    };

    let mut client = connect(database_url).await?;
    let report = migrations::runner()
        .set_target(target)
        .run_async(&mut client)
        .await
        .map_err(|e| {
            Error::ConfigurationError(format!("Migration failed: {}", e))
        })?;

    log_report(&report, "Marked as applied");

    Ok(())
}
