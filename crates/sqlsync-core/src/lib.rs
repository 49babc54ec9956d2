pub mod config;
pub mod error;
pub mod migration;

pub use config::{ConnectionConfig, ExecutionConfig, MigrationConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use migration::{ConnectionId, Direction, MigrationEntry, MigrationQueries};
