use tracing::debug;

use sqlsync_core::config::{MigrationSourceType, SyncConfig};
use sqlsync_core::error::Result;

use crate::migrations::{resolve_sql_migrations, MigrationContext};

/// What to load while preparing a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareOptions {
    pub load_migrations: bool,
}

/// Requirements loaded ahead of any connection being touched.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub context: Option<MigrationContext>,
}

/// Validate the configuration and preload what `options` asks for.
pub async fn prepare(config: &SyncConfig, options: PrepareOptions) -> Result<Prepared> {
    debug!(?options, "Prepare");
    config.validate()?;

    let context = if options.load_migrations {
        Some(resolve_migration_context(config).await?)
    } else {
        None
    };

    Ok(Prepared { context })
}

/// Resolve the migration context for the configured source type.
pub async fn resolve_migration_context(config: &SyncConfig) -> Result<MigrationContext> {
    debug!(
        source_type = %config.migration.source_type,
        "Initialize migration context"
    );

    match config.migration.source_type()? {
        MigrationSourceType::Sql => {
            let entries = resolve_sql_migrations(config).await?;
            debug!("Available migration sources: {:?}", entries);
            Ok(MigrationContext::new(entries))
        }
    }
}
