pub mod db;
pub mod migrations;
pub mod migrator;
pub mod orchestrator;
pub mod prepare;
pub mod sequential;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::Database;
pub use migrations::{
    BoundContext, Connector, MigrationBatch, MigrationContext, MigrationExecutor, MigrationList,
    PgConnector,
};
pub use migrator::Migrator;
pub use orchestrator::{NoopHandler, OperationResult, ResultHandler};
pub use prepare::{prepare, PrepareOptions, Prepared};
pub use sequential::{run_sequentially, with_timeout};
