//! Bounded log store: transmission and health logs, per-transmission detail
//! records, user registry, templates, scheduled requests and counters.
//!
//! Business logic only talks to the [`LogStore`] trait. [`JsonStore`] persists
//! to JSON / JSON Lines files under a data directory; [`MemoryStore`] keeps
//! everything in process for tests and dry runs.

pub mod bounded;
pub mod json;
pub mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::stats::SystemStats;
use crate::dispatch::{TransmissionRequest, TransmissionResult};
use crate::maintenance::health::HealthSample;

pub use bounded::BoundedLog;
pub use json::JsonStore;
pub use memory::MemoryStore;

/// Default transmission log capacity.
pub const DEFAULT_TRANSMISSION_CAP: usize = 10_000;

/// Default health log capacity.
pub const DEFAULT_HEALTH_CAP: usize = 1_000;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O failed at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Record could not be encoded or decoded.
    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A user who has contacted the bot. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Telegram user id.
    pub id: i64,
    /// Display name at last contact.
    pub display_name: String,
    /// First contact.
    pub joined_at: DateTime<Utc>,
    /// Latest contact.
    pub last_active: DateTime<Utc>,
    /// Requests this user has had transmitted.
    pub total_sms: u64,
}

/// Reusable message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Short name.
    pub name: String,
    /// Message text.
    pub body: String,
}

/// Request held until its release time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRequest {
    /// Request to release.
    pub request: TransmissionRequest,
    /// Release time.
    pub scheduled_at: DateTime<Utc>,
}

/// Full copy of every collection, used for backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreExport {
    /// Transmission log, oldest first.
    pub transmissions: Vec<TransmissionResult>,
    /// Health log, oldest first.
    pub health: Vec<HealthSample>,
    /// User registry ordered by id.
    pub users: Vec<UserRecord>,
    /// Templates.
    pub templates: Vec<Template>,
    /// Pending scheduled requests.
    pub scheduled: Vec<ScheduledRequest>,
    /// Last saved counters.
    pub stats: Option<SystemStats>,
}

/// Storage interface for every persisted collection.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append to the bounded transmission log and write the detail record.
    async fn append_transmission(&self, result: &TransmissionResult) -> Result<(), StoreError>;
    /// Up to `limit` newest transmissions, newest first.
    async fn recent_transmissions(&self, limit: usize) -> Vec<TransmissionResult>;
    /// Entries currently in the transmission log.
    async fn transmission_count(&self) -> usize;
    /// Detail record for one transmission id.
    async fn transmission_detail(&self, id: &str) -> Result<Option<TransmissionResult>, StoreError>;

    /// Append to the bounded health log.
    async fn append_health(&self, sample: &HealthSample) -> Result<(), StoreError>;
    /// Entries currently in the health log.
    async fn health_count(&self) -> usize;
    /// Newest health sample.
    async fn latest_health(&self) -> Option<HealthSample>;

    /// Create the user on first contact, otherwise refresh name and `last_active`.
    async fn touch_user(
        &self,
        id: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError>;
    /// Add `count` to a user's transmitted total. Unknown users are ignored.
    async fn add_user_sms(&self, id: i64, count: u64) -> Result<(), StoreError>;
    /// Registered users ordered by id.
    async fn users(&self) -> Vec<UserRecord>;

    /// All templates.
    async fn templates(&self) -> Vec<Template>;
    /// Insert or replace a template by name.
    async fn save_template(&self, template: Template) -> Result<(), StoreError>;

    /// Hold a request until `scheduled_at`.
    async fn add_scheduled(&self, entry: ScheduledRequest) -> Result<(), StoreError>;
    /// Remove and return every entry due at or before `now`, earliest first.
    async fn take_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledRequest>, StoreError>;
    /// Pending scheduled entries.
    async fn scheduled(&self) -> Vec<ScheduledRequest>;

    /// Persist the counters.
    async fn save_stats(&self, stats: &SystemStats) -> Result<(), StoreError>;
    /// Last persisted counters.
    async fn load_stats(&self) -> Option<SystemStats>;

    /// Copy of every collection.
    async fn export(&self) -> StoreExport;
    /// Re-read persisted state, discarding in-memory caches.
    async fn reload(&self) -> Result<(), StoreError>;
    /// Directory holding per-transmission detail files, if the store has one.
    fn detail_dir(&self) -> Option<PathBuf>;
}

/// Default templates seeded into an empty store.
pub fn default_templates() -> Vec<Template> {
    [
        ("greeting", "Hello! Hope you are doing well."),
        ("reminder", "Friendly reminder about our appointment today."),
        ("meeting", "The meeting has been moved. Please check your calendar."),
        ("thanks", "Thank you for your time and support."),
        ("urgent", "URGENT: please call back as soon as possible."),
    ]
    .into_iter()
    .map(|(name, body)| Template {
        name: name.to_owned(),
        body: body.to_owned(),
    })
    .collect()
}

/// In-memory state shared by both store implementations.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) transmissions: BoundedLog<TransmissionResult>,
    pub(crate) details: BTreeMap<String, TransmissionResult>,
    pub(crate) health: BoundedLog<HealthSample>,
    pub(crate) users: BTreeMap<i64, UserRecord>,
    pub(crate) templates: Vec<Template>,
    pub(crate) scheduled: Vec<ScheduledRequest>,
    pub(crate) stats: Option<SystemStats>,
}

impl StoreState {
    pub(crate) fn new(transmission_cap: usize, health_cap: usize) -> Self {
        Self {
            transmissions: BoundedLog::new(transmission_cap),
            details: BTreeMap::new(),
            health: BoundedLog::new(health_cap),
            users: BTreeMap::new(),
            templates: default_templates(),
            scheduled: Vec::new(),
            stats: None,
        }
    }

    pub(crate) fn touch_user(
        &mut self,
        id: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> UserRecord {
        let record = self.users.entry(id).or_insert_with(|| UserRecord {
            id,
            display_name: display_name.to_owned(),
            joined_at: now,
            last_active: now,
            total_sms: 0,
        });
        record.last_active = now;
        if !display_name.is_empty() {
            display_name.clone_into(&mut record.display_name);
        }
        record.clone()
    }

    pub(crate) fn add_user_sms(&mut self, id: i64, count: u64) -> bool {
        match self.users.get_mut(&id) {
            Some(record) => {
                record.total_sms = record.total_sms.saturating_add(count);
                true
            }
            None => false,
        }
    }

    pub(crate) fn save_template(&mut self, template: Template) {
        match self.templates.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => *existing = template,
            None => self.templates.push(template),
        }
    }

    pub(crate) fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledRequest> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .scheduled
            .drain(..)
            .partition(|entry| entry.scheduled_at <= now);
        self.scheduled = pending;
        due.sort_by_key(|entry| entry.scheduled_at);
        due
    }

    pub(crate) fn export(&self) -> StoreExport {
        StoreExport {
            transmissions: self.transmissions.iter().cloned().collect(),
            health: self.health.iter().cloned().collect(),
            users: self.users.values().cloned().collect(),
            templates: self.templates.clone(),
            scheduled: self.scheduled.clone(),
            stats: self.stats.clone(),
        }
    }
}
