//! Programmatic API, one function per migration command.
//!
//! Every call validates the configuration and resolves the migration
//! directory before any connection is touched; configuration, directory and
//! file errors abort the call. Per-connection failures are returned as data in
//! the result list.

use chrono::Utc;
use tracing::{info_span, Instrument};

use sqlsync_core::config::{ConnectionConfig, SyncConfig};
use sqlsync_core::error::{Result, SyncError};
use sqlsync_runtime::migrations::{GeneratedMigration, MigrationGenerator};
use sqlsync_runtime::{
    prepare, Connector, MigrationBatch, MigrationList, Migrator, OperationResult, PrepareOptions,
    ResultHandler,
};

/// List completed and pending migrations on every connection.
pub async fn migrate_list(
    config: &SyncConfig,
    connections: &[ConnectionConfig],
    connector: &dyn Connector,
    handler: &dyn ResultHandler<MigrationList>,
) -> Result<Vec<OperationResult<MigrationList>>> {
    async {
        let migrator = migrator(config, connector).await?;
        Ok(migrator.list(connections, handler).await)
    }
    .instrument(info_span!("migrate", operation = "list"))
    .await
}

/// Apply all pending migrations on every connection.
pub async fn migrate_latest(
    config: &SyncConfig,
    connections: &[ConnectionConfig],
    connector: &dyn Connector,
    handler: &dyn ResultHandler<MigrationBatch>,
) -> Result<Vec<OperationResult<MigrationBatch>>> {
    async {
        let migrator = migrator(config, connector).await?;
        Ok(migrator.latest(connections, handler).await)
    }
    .instrument(info_span!("migrate", operation = "latest"))
    .await
}

/// Revert the last batch of migrations on every connection.
pub async fn migrate_rollback(
    config: &SyncConfig,
    connections: &[ConnectionConfig],
    connector: &dyn Connector,
    handler: &dyn ResultHandler<MigrationBatch>,
) -> Result<Vec<OperationResult<MigrationBatch>>> {
    async {
        let migrator = migrator(config, connector).await?;
        Ok(migrator.rollback(connections, handler).await)
    }
    .instrument(info_span!("migrate", operation = "rollback"))
    .await
}

/// Create an empty up/down file pair in the migration directory.
pub fn make_migration(config: &SyncConfig, name: &str) -> Result<GeneratedMigration> {
    config.validate()?;

    let generator = MigrationGenerator::new(config.migration_path());
    let migration = generator.generate(name, Utc::now())?;
    generator.write_migration(&migration)?;

    tracing::info!(name = %migration.name, "Created migration");
    Ok(migration)
}

async fn migrator<'a>(config: &SyncConfig, connector: &'a dyn Connector) -> Result<Migrator<'a>> {
    let prepared = prepare(config, PrepareOptions { load_migrations: true }).await?;
    let context = prepared
        .context
        .ok_or_else(|| SyncError::Config("Migration context was not loaded".into()))?;

    Ok(Migrator::new(context, connector).with_timeout(config.execution.timeout()))
}
