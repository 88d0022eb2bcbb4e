//! In-process [`LogStore`] with no persistence.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    LogStore, ScheduledRequest, StoreError, StoreExport, StoreState, Template, UserRecord,
};
use crate::dispatch::stats::SystemStats;
use crate::dispatch::TransmissionResult;
use crate::maintenance::health::HealthSample;

/// Store that keeps every collection in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Empty store with the given log capacities.
    pub fn new(transmission_cap: usize, health_cap: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::new(transmission_cap, health_cap)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(super::DEFAULT_TRANSMISSION_CAP, super::DEFAULT_HEALTH_CAP)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn append_transmission(&self, result: &TransmissionResult) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.transmissions.push(result.clone());
        state.details.insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn recent_transmissions(&self, limit: usize) -> Vec<TransmissionResult> {
        self.state.lock().await.transmissions.recent(limit)
    }

    async fn transmission_count(&self) -> usize {
        self.state.lock().await.transmissions.len()
    }

    async fn transmission_detail(&self, id: &str) -> Result<Option<TransmissionResult>, StoreError> {
        Ok(self.state.lock().await.details.get(id).cloned())
    }

    async fn append_health(&self, sample: &HealthSample) -> Result<(), StoreError> {
        self.state.lock().await.health.push(sample.clone());
        Ok(())
    }

    async fn health_count(&self) -> usize {
        self.state.lock().await.health.len()
    }

    async fn latest_health(&self) -> Option<HealthSample> {
        self.state.lock().await.health.last().cloned()
    }

    async fn touch_user(
        &self,
        id: i64,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRecord, StoreError> {
        Ok(self.state.lock().await.touch_user(id, display_name, now))
    }

    async fn add_user_sms(&self, id: i64, count: u64) -> Result<(), StoreError> {
        self.state.lock().await.add_user_sms(id, count);
        Ok(())
    }

    async fn users(&self) -> Vec<UserRecord> {
        self.state.lock().await.users.values().cloned().collect()
    }

    async fn templates(&self) -> Vec<Template> {
        self.state.lock().await.templates.clone()
    }

    async fn save_template(&self, template: Template) -> Result<(), StoreError> {
        self.state.lock().await.save_template(template);
        Ok(())
    }

    async fn add_scheduled(&self, entry: ScheduledRequest) -> Result<(), StoreError> {
        self.state.lock().await.scheduled.push(entry);
        Ok(())
    }

    async fn take_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledRequest>, StoreError> {
        Ok(self.state.lock().await.take_due(now))
    }

    async fn scheduled(&self) -> Vec<ScheduledRequest> {
        self.state.lock().await.scheduled.clone()
    }

    async fn save_stats(&self, stats: &SystemStats) -> Result<(), StoreError> {
        self.state.lock().await.stats = Some(stats.clone());
        Ok(())
    }

    async fn load_stats(&self) -> Option<SystemStats> {
        self.state.lock().await.stats.clone()
    }

    async fn export(&self) -> StoreExport {
        self.state.lock().await.export()
    }

    async fn reload(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn detail_dir(&self) -> Option<PathBuf> {
        None
    }
}
