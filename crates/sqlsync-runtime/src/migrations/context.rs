//! Resolved migration sets and their per-connection views.

use std::collections::HashSet;
use std::sync::Arc;

use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::{ConnectionId, Direction, MigrationEntry};

/// An immutable, ordered set of resolved migrations.
///
/// Entry order is apply order; its reverse is rollback order. The same context
/// is bound to every connection without touching the filesystem again.
#[derive(Debug, Clone)]
pub struct MigrationContext {
    entries: Arc<[MigrationEntry]>,
}

impl MigrationContext {
    pub fn new(entries: Vec<MigrationEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn entries(&self) -> &[MigrationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// View of the entries for one connection. Does no I/O.
    pub fn bind(&self, connection_id: ConnectionId) -> BoundContext {
        BoundContext {
            connection_id,
            entries: Arc::clone(&self.entries),
        }
    }
}

/// A migration context scoped to a single connection.
#[derive(Debug, Clone)]
pub struct BoundContext {
    connection_id: ConnectionId,
    entries: Arc<[MigrationEntry]>,
}

impl BoundContext {
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Entries in apply order.
    pub fn entries(&self) -> &[MigrationEntry] {
        &self.entries
    }

    pub fn migration_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn rollback_order(&self) -> impl Iterator<Item = &MigrationEntry> {
        self.entries.iter().rev()
    }

    pub fn get(&self, name: &str) -> Option<&MigrationEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Raw SQL text of `name` in `direction`.
    pub fn query(&self, name: &str, direction: Direction) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| SyncError::CorruptMigrations(vec![name.to_string()]))?
            .require(direction)
    }

    /// Entries not yet recorded as applied, in apply order.
    pub fn pending(&self, completed: &[String]) -> Vec<&MigrationEntry> {
        let completed: HashSet<&str> = completed.iter().map(String::as_str).collect();
        self.entries
            .iter()
            .filter(|e| !completed.contains(e.name.as_str()))
            .collect()
    }

    /// Applied migrations that no longer exist in the directory.
    pub fn missing(&self, completed: &[String]) -> Vec<String> {
        let known: HashSet<&str> = self.migration_names().collect();
        completed
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Entries to apply, checked before any SQL runs.
    pub fn plan_latest(&self, completed: &[String]) -> Result<Vec<&MigrationEntry>> {
        self.ensure_consistent(completed)?;

        let pending = self.pending(completed);
        for entry in &pending {
            entry.require(Direction::Up)?;
        }
        Ok(pending)
    }

    /// Entries to revert for `batch`, given in revert order.
    pub fn plan_rollback(
        &self,
        completed: &[String],
        batch: &[String],
    ) -> Result<Vec<&MigrationEntry>> {
        self.ensure_consistent(completed)?;

        batch
            .iter()
            .map(|name| -> Result<&MigrationEntry> {
                let entry = self
                    .get(name)
                    .ok_or_else(|| SyncError::CorruptMigrations(vec![name.clone()]))?;
                entry.require(Direction::Down)?;
                Ok(entry)
            })
            .collect()
    }

    fn ensure_consistent(&self, completed: &[String]) -> Result<()> {
        let missing = self.missing(completed);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::CorruptMigrations(missing))
        }
    }
}
