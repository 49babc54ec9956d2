mod context;
mod executor;
mod generator;
mod resolver;
mod runner;
mod scanner;

pub use context::{BoundContext, MigrationContext};
pub use executor::{BoxFuture, Connector, MigrationBatch, MigrationExecutor, MigrationList};
pub use generator::{GeneratedMigration, MigrationGenerator};
pub use resolver::{resolve_from_dir, resolve_sql_migrations};
pub use runner::{PgConnector, PgMigrationExecutor};
pub use scanner::get_sql_migration_names;
