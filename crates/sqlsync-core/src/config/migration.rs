use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Migration source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory holding the migration files, relative to `base_path`.
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Bookkeeping table recording applied migrations.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Kind of migration source. Only `sql` is supported.
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

impl MigrationConfig {
    /// Parsed source type, or a configuration error for unknown values.
    pub fn source_type(&self) -> Result<MigrationSourceType, SyncError> {
        self.source_type.parse()
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            table_name: default_table_name(),
            source_type: default_source_type(),
        }
    }
}

fn default_directory() -> String {
    "migrations".to_string()
}

fn default_table_name() -> String {
    "sqlsync_migrations".to_string()
}

fn default_source_type() -> String {
    "sql".to_string()
}

/// Supported migration source types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationSourceType {
    Sql,
}

impl FromStr for MigrationSourceType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(MigrationSourceType::Sql),
            other => Err(SyncError::Config(format!(
                "Unsupported migration.source_type value \"{}\"",
                other
            ))),
        }
    }
}
