//! Health samples and `health.json` file writing.
//!
//! One [`HealthSample`] is appended to the bounded health log each health
//! tick, and the same sample is written atomically to `health.json` so
//! `courier status` can read it without touching the store.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Point-in-time engine health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the engine started.
    pub uptime_secs: u64,
    /// `running` or `degraded`.
    pub status: String,
    /// Live sessions.
    pub active_sessions: usize,
    /// Pending queue depth.
    pub queue_depth: usize,
    /// Requests counted.
    pub total: u64,
    /// Requests whose outcome is success.
    pub successful: u64,
    /// Requests whose outcome is failure.
    pub failed: u64,
    /// Percentage of successful requests, absent before the first one.
    pub success_rate: Option<f64>,
}

impl HealthSample {
    /// Whether the engine was running normally.
    pub fn is_healthy(&self) -> bool {
        self.status == "running"
    }
}

/// Write the sample to disk atomically.
///
/// # Errors
///
/// Returns an error if serialization or file operations fail.
pub async fn write_health_file(sample: &HealthSample, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(sample).context("failed to serialize health sample")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("failed to create health directory")?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .context("failed to write health temp file")?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .context("failed to rename health temp file")?;

    debug!("health.json updated");
    Ok(())
}

/// Read the last written `health.json`.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub async fn read_health_file(path: &Path) -> anyhow::Result<HealthSample> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).context("failed to parse health.json")
}
