//! In-memory execution collaborator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::{ConnectionId, Direction, MigrationEntry};

use crate::migrations::{
    BoundContext, BoxFuture, Connector, MigrationBatch, MigrationExecutor, MigrationList,
};
use crate::sequential::run_sequentially;

/// Connector whose databases live in memory.
///
/// Each connection id gets its own bookkeeping: applied migrations with their
/// batch numbers and the SQL that was "executed", in order.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    databases: HashMap<ConnectionId, MemoryDatabase>,
    failures: HashMap<ConnectionId, String>,
    delays: HashMap<ConnectionId, Duration>,
    panics: HashMap<ConnectionId, String>,
    closed: Vec<ConnectionId>,
}

#[derive(Default)]
struct MemoryDatabase {
    applied: Vec<(String, i32)>,
    executed: Vec<String>,
}

impl MemoryDatabase {
    fn completed(&self) -> Vec<String> {
        self.applied.iter().map(|(name, _)| name.clone()).collect()
    }

    fn last_batch(&self) -> i32 {
        self.applied.iter().map(|(_, batch)| *batch).max().unwrap_or(0)
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail for `id` with `message`.
    pub fn fail_connection(&self, id: impl Into<ConnectionId>, message: impl Into<String>) {
        self.lock().failures.insert(id.into(), message.into());
    }

    /// Delay every operation on `id` by `delay`.
    pub fn set_delay(&self, id: impl Into<ConnectionId>, delay: Duration) {
        self.lock().delays.insert(id.into(), delay);
    }

    /// Make every operation on `id` panic with `message`.
    pub fn panic_on(&self, id: impl Into<ConnectionId>, message: impl Into<String>) {
        self.lock().panics.insert(id.into(), message.into());
    }

    /// Record `name` as applied on `id` in a new batch, without running SQL.
    pub fn mark_applied(&self, id: impl Into<ConnectionId>, name: impl Into<String>) {
        let mut state = self.lock();
        let db = state.databases.entry(id.into()).or_default();
        let batch = db.last_batch() + 1;
        db.applied.push((name.into(), batch));
    }

    /// Names recorded as applied on `id`, oldest first.
    pub fn applied(&self, id: impl Into<ConnectionId>) -> Vec<String> {
        self.lock()
            .databases
            .get(&id.into())
            .map(MemoryDatabase::completed)
            .unwrap_or_default()
    }

    /// SQL executed on `id`, in order.
    pub fn executed(&self, id: impl Into<ConnectionId>) -> Vec<String> {
        self.lock()
            .databases
            .get(&id.into())
            .map(|db| db.executed.clone())
            .unwrap_or_default()
    }

    /// Connections closed so far, in order.
    pub fn closed(&self) -> Vec<String> {
        self.lock().closed.iter().map(|id| id.to_string()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        connection: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn MigrationExecutor>>> {
        Box::pin(async move {
            let (delay, panic) = {
                let mut state = self.lock();
                if let Some(message) = state.failures.get(&connection.id) {
                    return Err(SyncError::Database(format!(
                        "Failed to connect to {}: {}",
                        connection.id, message
                    )));
                }
                state.databases.entry(connection.id.clone()).or_default();
                (
                    state.delays.get(&connection.id).copied(),
                    state.panics.get(&connection.id).cloned(),
                )
            };

            let executor: Box<dyn MigrationExecutor> = Box::new(MemoryExecutor {
                id: connection.id.clone(),
                connector: self.clone(),
                delay,
                panic,
            });
            Ok(executor)
        })
    }
}

struct MemoryExecutor {
    id: ConnectionId,
    connector: MemoryConnector,
    delay: Option<Duration>,
    panic: Option<String>,
}

impl MemoryExecutor {
    async fn pause(&self) {
        if let Some(message) = &self.panic {
            panic!("{}", message);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn with_db<R>(&self, f: impl FnOnce(&mut MemoryDatabase) -> R) -> R {
        let mut state = self.connector.lock();
        f(state.databases.entry(self.id.clone()).or_default())
    }

    async fn run_one(&self, entry: &MigrationEntry, direction: Direction, batch: i32) -> Result<String> {
        let sql = entry.require(direction)?;
        tokio::task::yield_now().await;

        self.with_db(|db| {
            db.executed.push(sql.to_string());
            match direction {
                Direction::Up => db.applied.push((entry.name.clone(), batch)),
                Direction::Down => db.applied.retain(|(name, _)| name != &entry.name),
            }
        });
        Ok(entry.name.clone())
    }
}

impl MigrationExecutor for MemoryExecutor {
    fn list<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationList>> {
        Box::pin(async move {
            self.pause().await;
            let completed = self.with_db(|db| db.completed());
            Ok(MigrationList::from_completed(ctx, completed))
        })
    }

    fn latest<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>> {
        Box::pin(async move {
            self.pause().await;
            let (completed, last_batch) = self.with_db(|db| (db.completed(), db.last_batch()));

            let pending = ctx.plan_latest(&completed)?;
            if pending.is_empty() {
                return Ok(MigrationBatch::default());
            }

            let batch = last_batch + 1;
            let names = run_sequentially(
                pending
                    .into_iter()
                    .map(|entry| move || self.run_one(entry, Direction::Up, batch))
                    .collect::<Vec<_>>(),
            )
            .await?;

            Ok(MigrationBatch { batch, names })
        })
    }

    fn rollback<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>> {
        Box::pin(async move {
            self.pause().await;
            let (completed, batch, names) = self.with_db(|db| {
                let batch = db.last_batch();
                let names: Vec<String> = db
                    .applied
                    .iter()
                    .rev()
                    .filter(|(_, b)| *b == batch)
                    .map(|(name, _)| name.clone())
                    .collect();
                (db.completed(), batch, names)
            });

            if batch == 0 {
                return Ok(MigrationBatch::default());
            }

            let plan = ctx.plan_rollback(&completed, &names)?;
            let names = run_sequentially(
                plan.into_iter()
                    .map(|entry| move || self.run_one(entry, Direction::Down, batch))
                    .collect::<Vec<_>>(),
            )
            .await?;

            Ok(MigrationBatch { batch, names })
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.connector.lock().closed.push(self.id.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationContext;

    fn bound() -> BoundContext {
        MigrationContext::new(vec![
            MigrationEntry::new("001_init", Some("CREATE TABLE a (id INT)".into()), Some("DROP TABLE a".into())),
            MigrationEntry::new("002_add_col", Some("ALTER TABLE a ADD b INT".into()), Some("ALTER TABLE a DROP b".into())),
        ])
        .bind("primary".into())
    }

    async fn executor(connector: &MemoryConnector) -> Box<dyn MigrationExecutor> {
        connector
            .connect(&ConnectionConfig::new("primary", "memory://primary"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_latest_then_rollback() {
        let connector = MemoryConnector::new();
        let executor = executor(&connector).await;
        let ctx = bound();

        let applied = executor.latest(&ctx).await.unwrap();
        assert_eq!(applied.batch, 1);
        assert_eq!(applied.names, vec!["001_init", "002_add_col"]);

        let again = executor.latest(&ctx).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(again.batch, 0);

        let reverted = executor.rollback(&ctx).await.unwrap();
        assert_eq!(reverted.batch, 1);
        assert_eq!(reverted.names, vec!["002_add_col", "001_init"]);
        assert!(connector.applied("primary").is_empty());
        assert_eq!(
            connector.executed("primary"),
            vec![
                "CREATE TABLE a (id INT)",
                "ALTER TABLE a ADD b INT",
                "ALTER TABLE a DROP b",
                "DROP TABLE a"
            ]
        );
    }

    #[tokio::test]
    async fn test_rollback_only_reverts_last_batch() {
        let connector = MemoryConnector::new();
        connector.mark_applied("primary", "001_init");
        let executor = executor(&connector).await;
        let ctx = bound();

        let applied = executor.latest(&ctx).await.unwrap();
        assert_eq!(applied.batch, 2);
        assert_eq!(applied.names, vec!["002_add_col"]);

        let reverted = executor.rollback(&ctx).await.unwrap();
        assert_eq!(reverted.names, vec!["002_add_col"]);
        assert_eq!(connector.applied("primary"), vec!["001_init"]);
    }

    #[tokio::test]
    async fn test_rollback_with_nothing_applied() {
        let connector = MemoryConnector::new();
        let executor = executor(&connector).await;

        let reverted = executor.rollback(&bound()).await.unwrap();
        assert_eq!(reverted, MigrationBatch::default());
    }

    #[tokio::test]
    async fn test_unknown_applied_migration_blocks_latest() {
        let connector = MemoryConnector::new();
        connector.mark_applied("primary", "000_deleted");
        let executor = executor(&connector).await;

        let err = executor.latest(&bound()).await.unwrap_err();
        assert!(matches!(err, SyncError::CorruptMigrations(_)));
        assert!(connector.executed("primary").is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = MemoryConnector::new();
        connector.fail_connection("primary", "refused");

        let result = connector
            .connect(&ConnectionConfig::new("primary", "memory://primary"))
            .await;
        assert!(result.is_err());
    }
}
