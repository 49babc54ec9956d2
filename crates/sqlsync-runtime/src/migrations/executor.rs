use std::future::Future;
use std::pin::Pin;

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::Result;

use super::context::BoundContext;

/// Boxed future returned by executors, connectors and result handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Applied and pending migrations of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationList {
    /// Names recorded as applied, oldest first.
    pub completed: Vec<String>,
    /// Names not yet applied, in apply order.
    pub pending: Vec<String>,
}

impl MigrationList {
    /// Build the listing from the names a connection has recorded.
    pub fn from_completed(ctx: &BoundContext, completed: Vec<String>) -> Self {
        let pending = ctx
            .pending(&completed)
            .into_iter()
            .map(|e| e.name.clone())
            .collect();

        Self { completed, pending }
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.pending.is_empty()
    }
}

/// Migrations applied or reverted together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationBatch {
    /// Batch number; 0 when nothing was run.
    pub batch: i32,
    /// Migration names in the order they were run.
    pub names: Vec<String>,
}

impl MigrationBatch {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Runs migrations against a single connection and keeps its bookkeeping.
pub trait MigrationExecutor: Send + Sync {
    /// List applied and pending migrations.
    fn list<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationList>>;

    /// Apply every pending migration as one new batch.
    fn latest<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>>;

    /// Revert the most recent batch.
    fn rollback<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>>;

    /// Release the connection. Called once the operation has finished.
    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Opens an executor for a configured connection.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        connection: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn MigrationExecutor>>>;
}
