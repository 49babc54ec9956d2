//! sqlsync - SQL migrations across many databases
//!
//! Discovers paired `<name>.up.sql` / `<name>.down.sql` files, and lists,
//! applies or rolls them back on every configured connection, reporting a
//! result per connection.

pub mod api;

pub use api::{make_migration, migrate_latest, migrate_list, migrate_rollback};

pub use sqlsync_core::{ConnectionConfig, ConnectionId, MigrationEntry, SyncConfig, SyncError};
pub use sqlsync_runtime::{
    Connector, MigrationBatch, MigrationContext, MigrationExecutor, MigrationList, NoopHandler,
    OperationResult, PgConnector, ResultHandler,
};
