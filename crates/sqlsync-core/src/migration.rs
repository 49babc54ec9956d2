//! Migration domain types shared by the resolver, the executors and the CLI.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Identifier of one configured database target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Direction a migration is run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// File name suffix for this direction, e.g. `.up.sql`.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Direction::Up => ".up.sql",
            Direction::Down => ".down.sql",
        }
    }

    /// File name holding this direction's SQL for the migration `name`.
    pub fn file_name(self, name: &str) -> String {
        format!("{}{}", name, self.file_suffix())
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// The SQL text of a migration, per direction.
///
/// Either side may be absent when its file does not exist. That is not an
/// error until the missing direction is actually requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationQueries {
    pub up: Option<String>,
    pub down: Option<String>,
}

impl MigrationQueries {
    pub fn get(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        }
    }

    pub fn has(&self, direction: Direction) -> bool {
        self.get(direction).is_some()
    }
}

/// A resolved migration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    /// Unit name, the file name without `.up.sql` / `.down.sql`.
    pub name: String,
    pub queries: MigrationQueries,
}

impl MigrationEntry {
    pub fn new(name: impl Into<String>, up: Option<String>, down: Option<String>) -> Self {
        Self {
            name: name.into(),
            queries: MigrationQueries { up, down },
        }
    }

    /// SQL for `direction`, or `MissingQuery` when the file was absent.
    pub fn require(&self, direction: Direction) -> Result<&str> {
        self.queries
            .get(direction)
            .ok_or_else(|| SyncError::MissingQuery {
                name: self.name.clone(),
                direction,
            })
    }
}
