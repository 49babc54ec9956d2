mod connection;
mod migration;

pub use connection::ConnectionConfig;
pub use migration::{MigrationConfig, MigrationSourceType};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// Root configuration for sqlsync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory the migration directory is resolved against.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Migration source configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Database targets, processed in the listed order.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// A relative `base_path` is resolved against the directory holding the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::parse_toml(&content)?;
        if config.base_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.base_path = parent.join(&config.base_path);
            }
        }

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Configuration rooted at `base_path` with defaults everywhere else.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            migration: MigrationConfig::default(),
            execution: ExecutionConfig::default(),
            connections: Vec::new(),
        }
    }

    /// Full path of the migration directory.
    pub fn migration_path(&self) -> PathBuf {
        self.base_path.join(&self.migration.directory)
    }

    /// Check the configuration before anything touches the filesystem or a database.
    pub fn validate(&self) -> Result<()> {
        self.migration.source_type()?;

        if !TABLE_NAME.is_match(&self.migration.table_name) {
            return Err(SyncError::Config(format!(
                "Invalid migration.table_name \"{}\": expected an SQL identifier",
                self.migration.table_name
            )));
        }

        if self.execution.timeout_secs == Some(0) {
            return Err(SyncError::Config(
                "execution.timeout_secs must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for connection in &self.connections {
            if connection.id.as_str().trim().is_empty() {
                return Err(SyncError::Config("Connection id must not be empty".into()));
            }
            if connection.url.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "Connection \"{}\" has an empty url",
                    connection.id
                )));
            }
            if !seen.insert(&connection.id) {
                return Err(SyncError::Config(format!(
                    "Duplicate connection id \"{}\"",
                    connection.id
                )));
            }
        }

        Ok(())
    }

    /// Connections to run against, optionally restricted to a single id.
    pub fn select_connections(&self, only: Option<&str>) -> Result<Vec<ConnectionConfig>> {
        match only {
            None => Ok(self.connections.clone()),
            Some(id) => {
                let selected: Vec<_> = self
                    .connections
                    .iter()
                    .filter(|c| c.id.as_str() == id)
                    .cloned()
                    .collect();

                if selected.is_empty() {
                    return Err(SyncError::Config(format!(
                        "No connection configured with id \"{}\"",
                        id
                    )));
                }
                Ok(selected)
            }
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    /// Per-connection operation timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
