//! PostgreSQL migration executor with advisory locking.
//!
//! Only one process applies or reverts migrations on a database at a time;
//! the lock is a session-level PostgreSQL advisory lock held on a dedicated
//! pool connection.

use std::iter::Peekable;
use std::str::Chars;

use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use tracing::{debug, info, warn};

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::{Direction, MigrationEntry};

use super::context::BoundContext;
use super::executor::{BoxFuture, Connector, MigrationBatch, MigrationExecutor, MigrationList};
use crate::db::Database;
use crate::sequential::run_sequentially;

/// Lock ID for the migration advisory lock, "SQLSYNC" in hex.
const MIGRATION_LOCK_ID: i64 = 0x53514C53594E43;

/// Opens a [`PgMigrationExecutor`] per connection.
#[derive(Debug, Clone)]
pub struct PgConnector {
    table_name: String,
}

impl PgConnector {
    /// `table_name` must already be validated as an SQL identifier.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

impl Connector for PgConnector {
    fn connect<'a>(
        &'a self,
        connection: &'a ConnectionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn MigrationExecutor>>> {
        Box::pin(async move {
            let db = Database::connect(connection).await?;
            debug!(connection = %connection.id, "Connected");

            let executor: Box<dyn MigrationExecutor> =
                Box::new(PgMigrationExecutor::new(db, self.table_name.clone()));
            Ok(executor)
        })
    }
}

/// Migration executor backed by a PostgreSQL bookkeeping table.
pub struct PgMigrationExecutor {
    db: Database,
    table: String,
}

impl PgMigrationExecutor {
    pub fn new(db: Database, table: String) -> Self {
        Self { db, table }
    }

    async fn acquire_lock(&self) -> Result<PoolConnection<Postgres>> {
        debug!(connection = %self.db.id(), "Acquiring migration lock...");
        let mut conn = self.db.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to acquire migration lock: {}", e)))?;
        debug!(connection = %self.db.id(), "Migration lock acquired");
        Ok(conn)
    }

    async fn release_lock(&self, mut conn: PoolConnection<Postgres>) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(|e| SyncError::Database(format!("Failed to release migration lock: {}", e)))?;
        debug!(connection = %self.db.id(), "Migration lock released");
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                batch INTEGER NOT NULL,
                migration_time TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(self.db.pool())
            .await
            .map_err(|e| SyncError::Database(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| SyncError::Database(format!("Failed to look up migrations table: {}", e)))
    }

    async fn completed(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT name FROM {} ORDER BY id", self.table);
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| SyncError::Database(format!("Failed to get applied migrations: {}", e)))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn last_batch(&self) -> Result<i32> {
        let sql = format!("SELECT COALESCE(MAX(batch), 0) FROM {}", self.table);
        sqlx::query_scalar::<_, i32>(&sql)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| SyncError::Database(format!("Failed to get last batch: {}", e)))
    }

    /// Names in `batch`, most recently applied first.
    async fn batch_names(&self, batch: i32) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {} WHERE batch = $1 ORDER BY id DESC",
            self.table
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(batch)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| SyncError::Database(format!("Failed to get batch {}: {}", batch, e)))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Run `work` while holding the migration lock; the lock is always released.
    ///
    /// The bookkeeping table is created under the lock, since concurrent
    /// `CREATE TABLE IF NOT EXISTS` can still collide in the catalog.
    async fn locked<T>(&self, work: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let lock = self.acquire_lock().await?;

        let result = match self.ensure_migrations_table().await {
            Ok(()) => work.await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.release_lock(lock).await {
            warn!(connection = %self.db.id(), "Failed to release migration lock: {}", e);
        }

        result
    }

    async fn latest_inner(&self, ctx: &BoundContext) -> Result<MigrationBatch> {
        let completed = self.completed().await?;
        debug!(connection = %self.db.id(), "Already applied migrations: {:?}", completed);

        let pending = ctx.plan_latest(&completed)?;
        if pending.is_empty() {
            return Ok(MigrationBatch::default());
        }

        let batch = self.last_batch().await? + 1;
        let names = run_sequentially(
            pending
                .into_iter()
                .map(|entry| move || self.run_migration(entry, Direction::Up, batch))
                .collect::<Vec<_>>(),
        )
        .await?;

        Ok(MigrationBatch { batch, names })
    }

    async fn rollback_inner(&self, ctx: &BoundContext) -> Result<MigrationBatch> {
        let completed = self.completed().await?;
        let batch = self.last_batch().await?;
        if batch == 0 {
            return Ok(MigrationBatch::default());
        }

        let names = self.batch_names(batch).await?;
        let plan = ctx.plan_rollback(&completed, &names)?;
        let names = run_sequentially(
            plan.into_iter()
                .map(|entry| move || self.run_migration(entry, Direction::Down, batch))
                .collect::<Vec<_>>(),
        )
        .await?;

        Ok(MigrationBatch { batch, names })
    }

    /// Run one migration in its own transaction and update the bookkeeping table.
    async fn run_migration(
        &self,
        entry: &MigrationEntry,
        direction: Direction,
        batch: i32,
    ) -> Result<String> {
        let sql = entry.require(direction)?;
        info!(connection = %self.db.id(), %direction, "Running migration: {}", entry.name);

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            SyncError::Database(format!("Failed to start transaction: {}", e))
        })?;

        for statement in split_sql_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    SyncError::Database(format!(
                        "Failed to run migration '{}' ({}): {}",
                        entry.name, direction, e
                    ))
                })?;
        }

        let record = match direction {
            Direction::Up => format!("INSERT INTO {} (name, batch) VALUES ($1, $2)", self.table),
            Direction::Down => format!("DELETE FROM {} WHERE name = $1 AND batch = $2", self.table),
        };
        sqlx::query(&record)
            .bind(&entry.name)
            .bind(batch)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                SyncError::Database(format!(
                    "Failed to record migration '{}': {}",
                    entry.name, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            SyncError::Database(format!(
                "Failed to commit migration '{}': {}",
                entry.name, e
            ))
        })?;

        info!(connection = %self.db.id(), %direction, "Migration complete: {}", entry.name);
        Ok(entry.name.clone())
    }
}

impl MigrationExecutor for PgMigrationExecutor {
    fn list<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationList>> {
        Box::pin(async move {
            let completed = if self.table_exists().await? {
                self.completed().await?
            } else {
                Vec::new()
            };
            Ok(MigrationList::from_completed(ctx, completed))
        })
    }

    fn latest<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>> {
        Box::pin(self.locked(self.latest_inner(ctx)))
    }

    fn rollback<'a>(&'a self, ctx: &'a BoundContext) -> BoxFuture<'a, Result<MigrationBatch>> {
        Box::pin(self.locked(self.rollback_inner(ctx)))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.db.close())
    }
}

/// Split SQL into individual statements.
///
/// A `;` only ends a statement outside quoted strings, quoted identifiers,
/// comments and dollar-quoted bodies (PL/pgSQL functions). Pieces holding
/// nothing but whitespace and comments are dropped.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ';' => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
                continue;
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                take_block_comment(&mut chars, &mut current);
                continue;
            }
            _ => {}
        }

        let follows_identifier = current
            .chars()
            .last()
            .is_some_and(|p| p.is_alphanumeric() || p == '_');
        has_code |= !c.is_whitespace();
        current.push(c);

        match c {
            '\'' | '"' => {
                // A doubled quote closes and reopens, which keeps the text intact.
                for next in chars.by_ref() {
                    current.push(next);
                    if next == c {
                        break;
                    }
                }
            }
            '$' if !follows_identifier => {
                if let Some(tag) = take_dollar_tag(&mut chars, &mut current) {
                    let body_start = current.len();
                    for next in chars.by_ref() {
                        current.push(next);
                        if current.len() - body_start >= tag.len() && current.ends_with(&tag) {
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// Consume a (possibly nested) `/* */` comment whose `/` was already taken.
fn take_block_comment(chars: &mut Peekable<Chars<'_>>, current: &mut String) {
    let mut depth = 0usize;
    let mut prev = '/';

    for c in chars.by_ref() {
        current.push(c);
        match (prev, c) {
            ('/', '*') => {
                depth += 1;
                prev = '\0';
            }
            ('*', '/') => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
                prev = '\0';
            }
            _ => prev = c,
        }
    }
}

/// Read the rest of a `$tag$` opener whose first `$` was already taken.
///
/// Returns `None` for anything that is not a tag, such as a `$1` parameter.
fn take_dollar_tag(chars: &mut Peekable<Chars<'_>>, current: &mut String) -> Option<String> {
    let mut tag = String::from("$");

    while let Some(&c) = chars.peek() {
        if c == '$' {
            chars.next();
            current.push(c);
            tag.push(c);
            return Some(tag);
        }
        if !(c.is_alphanumeric() || c == '_') || (tag.len() == 1 && c.is_ascii_digit()) {
            return None;
        }
        chars.next();
        current.push(c);
        tag.push(c);
    }

    None
}
