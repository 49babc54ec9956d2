use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::Result;

use crate::migrations::{
    BoundContext, BoxFuture, Connector, MigrationBatch, MigrationContext, MigrationExecutor,
    MigrationList,
};
use crate::orchestrator::{run_for_connections, OperationResult, ResultHandler};
use crate::sequential::with_timeout;

/// Drives list / latest / rollback across connections.
///
/// Each connection gets its own executor from the [`Connector`], which is
/// closed before the next connection is opened.
pub struct Migrator<'a> {
    context: MigrationContext,
    connector: &'a dyn Connector,
    timeout: Option<Duration>,
}

impl<'a> Migrator<'a> {
    pub fn new(context: MigrationContext, connector: &'a dyn Connector) -> Self {
        Self {
            context,
            connector,
            timeout: None,
        }
    }

    /// Per-connection time limit, see [`with_timeout`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn context(&self) -> &MigrationContext {
        &self.context
    }

    pub async fn list(
        &self,
        connections: &[ConnectionConfig],
        handler: &dyn ResultHandler<MigrationList>,
    ) -> Vec<OperationResult<MigrationList>> {
        self.run(connections, handler, |executor, ctx| executor.list(ctx))
            .await
    }

    pub async fn latest(
        &self,
        connections: &[ConnectionConfig],
        handler: &dyn ResultHandler<MigrationBatch>,
    ) -> Vec<OperationResult<MigrationBatch>> {
        self.run(connections, handler, |executor, ctx| executor.latest(ctx))
            .await
    }

    pub async fn rollback(
        &self,
        connections: &[ConnectionConfig],
        handler: &dyn ResultHandler<MigrationBatch>,
    ) -> Vec<OperationResult<MigrationBatch>> {
        self.run(connections, handler, |executor, ctx| executor.rollback(ctx))
            .await
    }

    async fn run<T, F>(
        &self,
        connections: &[ConnectionConfig],
        handler: &dyn ResultHandler<T>,
        operation: F,
    ) -> Vec<OperationResult<T>>
    where
        F: for<'e> Fn(&'e dyn MigrationExecutor, &'e BoundContext) -> BoxFuture<'e, Result<T>>,
    {
        let operation = &operation;
        run_for_connections(connections, handler, |connection| async move {
            let ctx = self.context.bind(connection.id.clone());
            let executor = self.connector.connect(connection).await?;

            let outcome = AssertUnwindSafe(async {
                with_timeout(self.timeout, operation(executor.as_ref(), &ctx)).await
            })
            .catch_unwind()
            .await;
            executor.close().await;

            // Re-raised so the orchestrator reports it as this connection's failure.
            outcome.unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
        .await
    }
}
