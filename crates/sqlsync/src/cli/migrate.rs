use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::Path;

use sqlsync::api::{make_migration, migrate_latest, migrate_list, migrate_rollback};
use sqlsync_core::config::SyncConfig;
use sqlsync_runtime::orchestrator::failed_count;
use sqlsync_runtime::PgConnector;

use super::output::{BatchPrinter, ListPrinter};

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Configuration file path.
    #[arg(short, long, default_value = "sqlsync.toml", global = true)]
    pub config: String,

    /// Only run against the connection with this id.
    #[arg(long, global = true)]
    pub only: Option<String>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// List completed and pending migrations.
    List,

    /// Run all pending migrations.
    Latest,

    /// Rollback the last batch of migrations.
    Rollback,

    /// Create a new pair of migration files.
    Make {
        /// Migration name.
        name: String,
    },
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let config_path = Path::new(&self.config);
        if !config_path.exists() {
            anyhow::bail!("Configuration file not found: {}", self.config);
        }

        let config = SyncConfig::from_file(config_path)?;

        if let MigrateAction::Make { name } = &self.action {
            let migration = make_migration(&config, name)?;
            println!();
            println!("  {} Created migration {}", style("✓").green(), style(&migration.name).cyan());
            println!("    {}", style(migration.up_path.display()).dim());
            println!("    {}", style(migration.down_path.display()).dim());
            println!();
            return Ok(());
        }

        let connections = config.select_connections(self.only.as_deref())?;
        let connector = PgConnector::new(&config.migration.table_name);
        println!();

        let failed = match self.action {
            MigrateAction::List => {
                let results = migrate_list(&config, &connections, &connector, &ListPrinter).await?;
                failed_count(&results)
            }
            MigrateAction::Latest => {
                let printer = BatchPrinter::applied();
                let results = migrate_latest(&config, &connections, &connector, &printer).await?;
                failed_count(&results)
            }
            MigrateAction::Rollback => {
                let printer = BatchPrinter::rolled_back();
                let results = migrate_rollback(&config, &connections, &connector, &printer).await?;
                failed_count(&results)
            }
            MigrateAction::Make { .. } => 0,
        };

        if connections.is_empty() {
            println!("  {} No connections configured", style("ℹ").blue());
        }

        if failed > 0 {
            anyhow::bail!(
                "{} of {} connection(s) failed",
                failed,
                connections.len()
            );
        }

        Ok(())
    }
}
