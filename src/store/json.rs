//! File-backed [`LogStore`].
//!
//! Layout under the data directory:
//!
//! ```text
//! transmissions.jsonl     bounded transmission log (JSON Lines)
//! health.jsonl            bounded health log (JSON Lines)
//! transmissions/<id>.json one detail record per transmission
//! users.json              user registry
//! templates.json          templates
//! scheduled.json          pending scheduled requests
//! stats.json              last saved counters
//! ```
//!
//! Bounded logs are appended line by line. Once evictions since the last
//! compaction reach a tenth of the capacity, the file is rewritten from the
//! in-memory log. Reading a log back always keeps only the newest `capacity`
//! lines, so a reader never sees more than the cap.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    BoundedLog, LogStore, ScheduledRequest, StoreError, StoreExport, StoreState, Template,
    UserRecord,
};
use crate::dispatch::stats::SystemStats;
use crate::dispatch::TransmissionResult;
use crate::maintenance::health::HealthSample;

const TRANSMISSIONS_FILE: &str = "transmissions.jsonl";
const HEALTH_FILE: &str = "health.jsonl";
const DETAIL_DIR: &str = "transmissions";
const USERS_FILE: &str = "users.json";
const TEMPLATES_FILE: &str = "templates.json";
const SCHEDULED_FILE: &str = "scheduled.json";
const STATS_FILE: &str = "stats.json";

#[derive(Debug)]
struct JsonState {
    inner: StoreState,
    transmission_evictions: usize,
    health_evictions: usize,
}

/// Store persisting every collection as JSON under one directory.
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    transmission_cap: usize,
    health_cap: usize,
    state: Mutex<JsonState>,
}

impl JsonStore {
    /// Open (or create) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or an existing
    /// collection file cannot be read.
    pub async fn open(
        root: impl Into<PathBuf>,
        transmission_cap: usize,
        health_cap: usize,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        let details = root.join(DETAIL_DIR);
        tokio::fs::create_dir_all(&details)
            .await
            .map_err(|e| StoreError::io(&details, e))?;

        let inner = load_state(&root, transmission_cap, health_cap).await?;
        info!(
            root = %root.display(),
            transmissions = inner.transmissions.len(),
            users = inner.users.len(),
            "json store opened"
        );

        Ok(Self {
            root,
            transmission_cap,
            health_cap,
            state: Mutex::new(JsonState {
                inner,
                transmission_evictions: 0,
                health_evictions: 0,
            }),
        })
    }

    /// Data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn detail_path(&self, id: &str) -> Option<PathBuf> {
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        safe.then(|| self.root.join(DETAIL_DIR).join(format!("{id}.json")))
    }
}

#[async_trait]
impl LogStore for JsonStore {
    async fn append_transmission(&self, result: &TransmissionResult) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let path = self.path(TRANSMISSIONS_FILE);

        append_line(&path, result).await?;
        if state.inner.transmissions.push(result.clone()).is_some() {
            state.transmission_evictions = state.transmission_evictions.saturating_add(1);
        }
        if state.transmission_evictions >= compaction_threshold(self.transmission_cap) {
            rewrite_lines(&path, state.inner.transmissions.iter()).await?;
            state.transmission_evictions = 0;
            debug!(path = %path.display(), "transmission log compacted");
        }

        if let Some(detail) = self.detail_path(&result.id) {
            write_json_atomic(&detail, result).await?;
        } else {
            warn!(id = %result.id, "transmission id not usable as a file name, detail skipped");
        }
        Ok(())
    }

    async fn recent_transmissions(&self, limit: usize) -> Vec<TransmissionResult> {
        self.state.lock().await.inner.transmissions.recent(limit)
    }

    async fn transmission_count(&self) -> usize {
        self.state.lock().await.inner.transmissions.len()
    }

    async fn transmission_detail(&self, id: &str) -> Result<Option<TransmissionResult>, StoreError> {
        match self.detail_path(id) {
            Some(path) => read_json(&path).await,
            None => Ok(None),
        }
    }

    async fn append_health(&self, sample: &HealthSample) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let path = self.path(HEALTH_FILE);

        append_line(&path, sample).await?;
        if state.inner.health.push(sample.clone()).is_some() {
            state.health_evictions = state.health_evictions.saturating_add(1);
        }
        if state.health_evictions >= compaction_threshold(self.health_cap) {
            rewrite_lines(&path, state.inner.health.iter()).await?;
            state.health_evictions = 0;
            debug!(path = %path.display(), "health log compacted");
        }
        Ok(())
    }

    async fn health_count(&self) -> usize {
        self.state.lock().await.inner.health.len()
    }

    async fn latest_health(&self) -> Option<HealthSample> {
        self.state.lock().await.inner.health.last().cloned()
    }

    async fn touch_user(
        &self,
        id: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        let mut state = self.state.lock().await;
        let record = state.inner.touch_user(id, display_name, now);
        let users: Vec<&UserRecord> = state.inner.users.values().collect();
        write_json_atomic(&self.path(USERS_FILE), &users).await?;
        Ok(record)
    }

    async fn add_user_sms(&self, id: i64, count: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.inner.add_user_sms(id, count) {
            let users: Vec<&UserRecord> = state.inner.users.values().collect();
            write_json_atomic(&self.path(USERS_FILE), &users).await?;
        }
        Ok(())
    }

    async fn users(&self) -> Vec<UserRecord> {
        self.state.lock().await.inner.users.values().cloned().collect()
    }

    async fn templates(&self) -> Vec<Template> {
        self.state.lock().await.inner.templates.clone()
    }

    async fn save_template(&self, template: Template) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.inner.save_template(template);
        write_json_atomic(&self.path(TEMPLATES_FILE), &state.inner.templates).await
    }

    async fn add_scheduled(&self, entry: ScheduledRequest) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.inner.scheduled.push(entry);
        write_json_atomic(&self.path(SCHEDULED_FILE), &state.inner.scheduled).await
    }

    async fn take_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledRequest>, StoreError> {
        let mut state = self.state.lock().await;
        let due = state.inner.take_due(now);
        if !due.is_empty() {
            write_json_atomic(&self.path(SCHEDULED_FILE), &state.inner.scheduled).await?;
        }
        Ok(due)
    }

    async fn scheduled(&self) -> Vec<ScheduledRequest> {
        self.state.lock().await.inner.scheduled.clone()
    }

    async fn save_stats(&self, stats: &SystemStats) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.inner.stats = Some(stats.clone());
        write_json_atomic(&self.path(STATS_FILE), stats).await
    }

    async fn load_stats(&self) -> Option<SystemStats> {
        self.state.lock().await.inner.stats.clone()
    }

    async fn export(&self) -> StoreExport {
        self.state.lock().await.inner.export()
    }

    async fn reload(&self) -> Result<(), StoreError> {
        let inner = load_state(&self.root, self.transmission_cap, self.health_cap).await?;
        let mut state = self.state.lock().await;
        state.inner = inner;
        state.transmission_evictions = 0;
        state.health_evictions = 0;
        info!(root = %self.root.display(), "json store reloaded");
        Ok(())
    }

    fn detail_dir(&self) -> Option<PathBuf> {
        Some(self.root.join(DETAIL_DIR))
    }
}

/// Evictions tolerated in a log file before it is rewritten.
fn compaction_threshold(capacity: usize) -> usize {
    (capacity / 10).max(1)
}

async fn load_state(
    root: &Path,
    transmission_cap: usize,
    health_cap: usize,
) -> Result<StoreState, StoreError> {
    let mut state = StoreState::new(transmission_cap, health_cap);

    let transmissions_path = root.join(TRANSMISSIONS_FILE);
    let transmissions: Vec<TransmissionResult> = read_json_lines(&transmissions_path).await?;
    let over_cap = transmissions.len() > transmission_cap;
    state.transmissions = BoundedLog::from_entries(transmission_cap, transmissions);
    if over_cap {
        rewrite_lines(&transmissions_path, state.transmissions.iter()).await?;
    }

    let health_path = root.join(HEALTH_FILE);
    let health: Vec<HealthSample> = read_json_lines(&health_path).await?;
    let over_cap = health.len() > health_cap;
    state.health = BoundedLog::from_entries(health_cap, health);
    if over_cap {
        rewrite_lines(&health_path, state.health.iter()).await?;
    }

    if let Some(users) = read_json::<Vec<UserRecord>>(&root.join(USERS_FILE)).await? {
        state.users = users.into_iter().map(|u| (u.id, u)).collect();
    }

    let templates_path = root.join(TEMPLATES_FILE);
    match read_json::<Vec<Template>>(&templates_path).await? {
        Some(templates) => state.templates = templates,
        None => write_json_atomic(&templates_path, &state.templates).await?,
    }

    if let Some(scheduled) = read_json(&root.join(SCHEDULED_FILE)).await? {
        state.scheduled = scheduled;
    }
    state.stats = read_json(&root.join(STATS_FILE)).await?;

    Ok(state)
}

/// Read a JSON document, `None` when the file does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Read a JSON Lines file, skipping malformed lines.
async fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), line = index, error = %e, "skipping malformed log line"),
        }
    }
    Ok(entries)
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(&line)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.flush().await.map_err(|e| StoreError::io(path, e))
}

async fn rewrite_lines<'a, T: Serialize + 'a>(
    path: &Path,
    entries: impl Iterator<Item = &'a T>,
) -> Result<(), StoreError> {
    let mut buffer = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer).await
}

/// Write JSON to a temp file, then rename over the destination.
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
