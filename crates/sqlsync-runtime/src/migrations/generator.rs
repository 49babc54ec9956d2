use std::path::PathBuf;

use chrono::{DateTime, Utc};

use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::Direction;

/// Creates new, empty migration file pairs.
pub struct MigrationGenerator {
    /// Output directory for migrations.
    output_dir: PathBuf,
}

impl MigrationGenerator {
    /// Create a new migration generator.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Plan a migration named `name`, prefixed with the creation timestamp.
    ///
    /// The timestamp prefix keeps file-name order equal to creation order.
    pub fn generate(&self, name: &str, now: DateTime<Utc>) -> Result<GeneratedMigration> {
        let slug = slugify(name)?;
        let name = format!("{}_{}", now.format("%Y%m%d%H%M%S"), slug);

        Ok(GeneratedMigration {
            up_path: self.output_dir.join(Direction::Up.file_name(&name)),
            down_path: self.output_dir.join(Direction::Down.file_name(&name)),
            name,
            created_at: now,
        })
    }

    /// Write the up/down templates of `migration` to disk.
    pub fn write_migration(&self, migration: &GeneratedMigration) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;

        for (path, direction) in [
            (&migration.up_path, Direction::Up),
            (&migration.down_path, Direction::Down),
        ] {
            if path.exists() {
                return Err(SyncError::Config(format!(
                    "Migration file already exists: {}",
                    path.display()
                )));
            }

            let content = format!(
                "-- Migration: {} ({})\n-- Generated at: {}\n\n",
                migration.name,
                direction,
                migration.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            std::fs::write(path, content)?;
        }

        Ok(())
    }
}

/// A generated migration file pair.
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    /// Unit name, timestamp included.
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
    /// When the migration was created.
    pub created_at: DateTime<Utc>,
}

fn slugify(name: &str) -> Result<String> {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_').to_string();

    if slug.is_empty() {
        return Err(SyncError::Config(format!(
            "Invalid migration name \"{}\"",
            name
        )));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_generate_names_files() {
        let generator = MigrationGenerator::new("/tmp/migrations");
        let migration = generator.generate("Create Users", created_at()).unwrap();

        assert_eq!(migration.name, "20240301123005_create_users");
        assert!(migration
            .up_path
            .ends_with("20240301123005_create_users.up.sql"));
        assert!(migration
            .down_path
            .ends_with("20240301123005_create_users.down.sql"));
    }

    #[test]
    fn test_generate_rejects_empty_name() {
        let generator = MigrationGenerator::new("/tmp/migrations");
        assert!(generator.generate("  ", created_at()).is_err());
        assert!(generator.generate("../..", created_at()).is_err());
    }

    #[test]
    fn test_slug_cannot_smuggle_suffix() {
        assert_eq!(slugify("add.up.sql").unwrap(), "add_up_sql");
    }

    #[test]
    fn test_write_migration() {
        let dir = TempDir::new().unwrap();
        let generator = MigrationGenerator::new(dir.path().join("migrations"));
        let migration = generator.generate("add posts", created_at()).unwrap();

        generator.write_migration(&migration).unwrap();
        let up = std::fs::read_to_string(&migration.up_path).unwrap();
        assert!(up.starts_with("-- Migration: 20240301123005_add_posts (up)"));
        assert!(migration.down_path.exists());

        let err = generator.write_migration(&migration).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
