//! Periodic backup: JSON export of every collection plus a copy of the
//! per-transmission detail directory.
//!
//! Backups go into timestamped directories under the backups dir and are never
//! rotated.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::LogStore;

/// Result of a backup operation.
#[derive(Debug)]
pub struct BackupResult {
    /// Path to the backup directory.
    pub backup_dir: PathBuf,
    /// Number of collection files written.
    pub collections_written: usize,
    /// Whether the detail directory was copied.
    pub details_copied: bool,
    /// Total size of the backup in bytes.
    pub total_size_bytes: u64,
}

/// Export every collection from `store` into a new timestamped directory.
///
/// # Errors
///
/// Returns an error if the backup directory or a collection file cannot be
/// written. A failed detail copy is logged and reported in the result.
pub async fn create_backup(store: &dyn LogStore, backups_dir: &Path) -> anyhow::Result<BackupResult> {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let backup_dir = unique_dir(backups_dir, &timestamp);

    tokio::fs::create_dir_all(&backup_dir)
        .await
        .context("failed to create backup directory")?;

    info!(dir = %backup_dir.display(), "creating backup");

    let export = store.export().await;
    write_collection(&backup_dir, "transmissions.json", &export.transmissions).await?;
    write_collection(&backup_dir, "health.json", &export.health).await?;
    write_collection(&backup_dir, "users.json", &export.users).await?;
    write_collection(&backup_dir, "templates.json", &export.templates).await?;
    write_collection(&backup_dir, "scheduled.json", &export.scheduled).await?;
    write_collection(&backup_dir, "stats.json", &export.stats).await?;
    let collections_written = 6;

    let details_copied = match store.detail_dir() {
        Some(src) if src.exists() => {
            match copy_dir_recursive(&src, &backup_dir.join("transmissions")).await {
                Ok(size) => {
                    debug!(size_bytes = size, "detail records copied");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "detail record backup failed");
                    false
                }
            }
        }
        _ => {
            debug!("no detail directory, skipping");
            false
        }
    };

    let total_size_bytes = dir_size(&backup_dir).await.unwrap_or(0);

    info!(
        dir = %backup_dir.display(),
        details = details_copied,
        size_bytes = total_size_bytes,
        "backup complete"
    );

    Ok(BackupResult {
        backup_dir,
        collections_written,
        details_copied,
        total_size_bytes,
    })
}

/// `backups_dir/<timestamp>`, suffixed when two backups land in one second.
fn unique_dir(backups_dir: &Path, timestamp: &str) -> PathBuf {
    let first = backups_dir.join(timestamp);
    if !first.exists() {
        return first;
    }
    let mut n: u32 = 1;
    loop {
        let candidate = backups_dir.join(format!("{timestamp}-{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n = n.saturating_add(1);
    }
}

async fn write_collection<T: Serialize + ?Sized>(
    dir: &Path,
    name: &str,
    value: &T,
) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(value).with_context(|| format!("failed to serialize {name}"))?;
    tokio::fs::write(dir.join(name), json)
        .await
        .with_context(|| format!("failed to write {name}"))
}

/// Recursively copy a directory tree. Returns the total bytes copied.
async fn copy_dir_recursive(src: &Path, dst: &Path) -> anyhow::Result<u64> {
    let src = src.to_owned();
    let dst = dst.to_owned();

    tokio::task::spawn_blocking(move || copy_dir_recursive_sync(&src, &dst))
        .await
        .context("copy task panicked")?
}

fn copy_dir_recursive_sync(src: &Path, dst: &Path) -> anyhow::Result<u64> {
    std::fs::create_dir_all(dst)
        .with_context(|| format!("failed to create directory {}", dst.display()))?;

    let mut total_bytes = 0u64;

    for entry in std::fs::read_dir(src)
        .with_context(|| format!("failed to read directory {}", src.display()))?
    {
        let entry = entry.context("failed to read directory entry")?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type().context("failed to get file type")?;

        if file_type.is_dir() {
            total_bytes =
                total_bytes.saturating_add(copy_dir_recursive_sync(&src_path, &dst_path)?);
        } else if file_type.is_file() {
            let bytes = std::fs::copy(&src_path, &dst_path).with_context(|| {
                format!("failed to copy {} to {}", src_path.display(), dst_path.display())
            })?;
            total_bytes = total_bytes.saturating_add(bytes);
        }
    }

    Ok(total_bytes)
}

async fn dir_size(path: &Path) -> anyhow::Result<u64> {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || dir_size_sync(&path))
        .await
        .context("dir size task panicked")?
}

fn dir_size_sync(path: &Path) -> anyhow::Result<u64> {
    if path.is_file() {
        return Ok(std::fs::metadata(path)?.len());
    }

    let mut total = 0u64;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let p = entry?.path();
            total = total.saturating_add(dir_size_sync(&p)?);
        }
    }
    Ok(total)
}
