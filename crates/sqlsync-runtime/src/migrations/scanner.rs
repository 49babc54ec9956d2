//! Discovers migration units in a directory.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use sqlsync_core::error::{Result, SyncError};

static FILE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)\.(up|down)\.sql$").unwrap());

/// List the migration unit names found in `dir`.
///
/// `0001_init.up.sql` and `0001_init.down.sql` collapse into the single unit
/// `0001_init`; a unit may have only one of the two files. Other files are
/// ignored. Names come back in first-encounter order over the file listing,
/// which is sorted by file name so the order does not depend on the platform.
pub async fn get_sql_migration_names(dir: &Path) -> Result<Vec<String>> {
    let files = list_files(dir).await?;
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for filename in &files {
        if let Some(caps) = FILE_PATTERN.captures(filename) {
            let name = &caps[1];
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }

    debug!(
        dir = %dir.display(),
        files = files.len(),
        migrations = names.len(),
        "Scanned migration directory"
    );
    Ok(names)
}

async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| directory_error(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| directory_error(dir, e))?
    {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %path.display(), "Skipping unreadable entry: {}", e);
                continue;
            }
        }

        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(name) => debug!("Skipping non UTF-8 file name {:?}", name),
        }
    }

    files.sort();
    Ok(files)
}

fn directory_error(dir: &Path, e: std::io::Error) -> SyncError {
    SyncError::Directory(format!(
        "Failed to read migration directory {}: {}",
        dir.display(),
        e
    ))
}
