//! Dispatch counters with per-request outcome accounting.
//!
//! Each request id is counted once in `total`. A first failure counts as
//! `failed`; a later success for the same id moves that one count from
//! `failed` to `successful`. Repeated failures for the same id change nothing.
//! This keeps `successful + failed == total` at every point, even when retries
//! interleave with fresh failures.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    /// Distinct requests attempted.
    pub total: u64,
    /// Requests whose latest outcome is a success.
    pub successful: u64,
    /// Requests whose latest outcome is a failure.
    pub failed: u64,
    /// Time the counters started.
    pub start_time: DateTime<Utc>,
}

impl SystemStats {
    /// Success rate in percent, or `None` before any request.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let successful = u32::try_from(self.successful).ok()?;
        let total = u32::try_from(self.total).ok()?;
        Some(f64::from(successful) * 100.0 / f64::from(total))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
}

/// What changed when an outcome was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First outcome for this id.
    New,
    /// A previously failed id succeeded.
    Recovered,
    /// No counter changed.
    Unchanged,
}

/// Running counters plus the per-id outcome ledger.
#[derive(Debug)]
pub struct DispatchStats {
    stats: SystemStats,
    ledger: HashMap<String, Outcome>,
}

impl DispatchStats {
    /// Empty counters starting at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            stats: SystemStats {
                total: 0,
                successful: 0,
                failed: 0,
                start_time,
            },
            ledger: HashMap::new(),
        }
    }

    /// Counters restored from a persisted snapshot. The ledger starts empty.
    pub fn from_snapshot(stats: SystemStats) -> Self {
        Self {
            stats,
            ledger: HashMap::new(),
        }
    }

    /// Record the outcome of one attempt for `id`.
    pub fn record(&mut self, id: &str, success: bool) -> Recorded {
        let outcome = if success {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        };

        match self.ledger.get(id).copied() {
            None => {
                self.stats.total = self.stats.total.saturating_add(1);
                if success {
                    self.stats.successful = self.stats.successful.saturating_add(1);
                } else {
                    self.stats.failed = self.stats.failed.saturating_add(1);
                }
                self.ledger.insert(id.to_owned(), outcome);
                Recorded::New
            }
            Some(Outcome::Failed) if success => {
                self.stats.failed = self.stats.failed.saturating_sub(1);
                self.stats.successful = self.stats.successful.saturating_add(1);
                self.ledger.insert(id.to_owned(), outcome);
                Recorded::Recovered
            }
            Some(_) => Recorded::Unchanged,
        }
    }

    /// Drop the ledger entry once no further attempt can follow for `id`.
    pub fn finalize(&mut self, id: &str) {
        self.ledger.remove(id);
    }

    /// Number of ids still tracked in the ledger.
    pub fn tracked(&self) -> usize {
        self.ledger.len()
    }

    /// Current counters.
    pub fn snapshot(&self) -> SystemStats {
        self.stats.clone()
    }
}
