//! Loads the SQL text of every discovered migration unit.

use std::path::Path;

use futures::future::try_join_all;
use tracing::debug;

use sqlsync_core::config::SyncConfig;
use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::{Direction, MigrationEntry};

use super::scanner::get_sql_migration_names;

/// Resolve the migration sources under `base_path/migration.directory`.
pub async fn resolve_sql_migrations(config: &SyncConfig) -> Result<Vec<MigrationEntry>> {
    resolve_from_dir(&config.migration_path()).await
}

/// Resolve every migration unit in `dir`.
///
/// Units are read concurrently but returned in scanner order. The first file
/// that exists but cannot be read fails the whole resolution.
pub async fn resolve_from_dir(dir: &Path) -> Result<Vec<MigrationEntry>> {
    let names = get_sql_migration_names(dir).await?;
    let entries = try_join_all(names.into_iter().map(|name| resolve_entry(dir, name))).await?;

    debug!(
        dir = %dir.display(),
        count = entries.len(),
        "Resolved migration sources"
    );
    Ok(entries)
}

async fn resolve_entry(dir: &Path, name: String) -> Result<MigrationEntry> {
    let (up, down) = tokio::try_join!(
        read_optional(dir, &name, Direction::Up),
        read_optional(dir, &name, Direction::Down)
    )?;

    Ok(MigrationEntry::new(name, up, down))
}

async fn read_optional(dir: &Path, name: &str, direction: Direction) -> Result<Option<String>> {
    let path = dir.join(direction.file_name(name));

    // Same notion of "exists" as the scanner: a regular file, symlinks followed.
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SyncError::FileRead {
                path,
                reason: e.to_string(),
            })
        }
    }

    tokio::fs::read_to_string(&path)
        .await
        .map(Some)
        .map_err(|e| SyncError::FileRead {
            path,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_up_and_down() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_init.up.sql"), "CREATE TABLE a (id INT);").unwrap();
        fs::write(dir.path().join("001_init.down.sql"), "DROP TABLE a;").unwrap();

        let entries = resolve_from_dir(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "001_init");
        assert_eq!(entries[0].queries.up.as_deref(), Some("CREATE TABLE a (id INT);"));
        assert_eq!(entries[0].queries.down.as_deref(), Some("DROP TABLE a;"));
    }

    #[tokio::test]
    async fn test_resolve_single_direction() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_only_up.up.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("002_only_down.down.sql"), "SELECT 2;").unwrap();

        let entries = resolve_from_dir(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                MigrationEntry::new("001_only_up", Some("SELECT 1;".into()), None),
                MigrationEntry::new("002_only_down", None, Some("SELECT 2;".into())),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_from_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sql")).unwrap();
        fs::write(dir.path().join("sql/001_init.up.sql"), "SELECT 1;").unwrap();

        let mut config = SyncConfig::with_base_path(dir.path());
        config.migration.directory = "sql".into();

        let entries = resolve_sql_migrations(&config).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "001_init");
    }

    #[tokio::test]
    async fn test_resolution_order_is_stable() {
        let dir = TempDir::new().unwrap();
        for name in ["005_e", "001_a", "004_d", "002_b", "003_c"] {
            fs::write(dir.path().join(format!("{}.up.sql", name)), name).unwrap();
            fs::write(dir.path().join(format!("{}.down.sql", name)), name).unwrap();
        }

        let first = resolve_from_dir(dir.path()).await.unwrap();
        let second = resolve_from_dir(dir.path()).await.unwrap();
        let names: Vec<_> = first.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["001_a", "002_b", "003_c", "004_d", "005_e"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_resolution() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_ok.up.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("002_binary.up.sql"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = resolve_from_dir(dir.path()).await.unwrap_err();
        match err {
            SyncError::FileRead { path, .. } => {
                assert!(path.ends_with("002_binary.up.sql"));
            }
            other => panic!("expected FileRead, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_named_like_a_migration_is_not_a_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("001_init.up.sql")).unwrap();
        fs::write(dir.path().join("001_init.down.sql"), "DROP TABLE a;").unwrap();

        let entries = resolve_from_dir(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![MigrationEntry::new("001_init", None, Some("DROP TABLE a;".into()))]
        );
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = resolve_from_dir(&dir.path().join("absent")).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
