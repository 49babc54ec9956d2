mod migrate;
mod output;

pub use migrate::MigrateCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// sqlsync - SQL migrations across many databases
#[derive(Parser)]
#[command(name = "sqlsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage database migrations.
    Migrate(MigrateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let log_level = if self.verbose { "debug" } else { "warn" };
        tracing_subscriber::fmt()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
            .with_writer(std::io::stderr)
            .init();

        match self.command {
            Commands::Migrate(cmd) => cmd.execute().await,
        }
    }
}
