//! Engine context: the one object every handler and periodic task shares.
//!
//! Owns the session manager, counters, pending queue, random source,
//! transmitter and store. A confirmed single send runs through
//! optimizer → transmitter immediately and gets one delayed retry on failure;
//! bulk sends go onto the queue; scheduled sends wait in the store until the
//! maintenance tick releases them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::executor::{SharedRandom, SimulatedTransmitter, Transmitter};
use crate::dispatch::optimizer::{self, OptimizationProfile};
use crate::dispatch::queue::{DispatchQueue, DrainOutcome, RetryPolicy};
use crate::dispatch::random::{RandomSource, SeededRandom};
use crate::dispatch::stats::{DispatchStats, Recorded, SystemStats};
use crate::dispatch::{DispatchError, TransmissionRequest, TransmissionResult, TransmissionStatus};
use crate::maintenance::health::HealthSample;
use crate::session::{Mode, Session, SessionManager, Step, TurnOutcome};
use crate::store::{LogStore, ScheduledRequest, Template};

/// Dispatch settings the engine needs from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Methods in tie-break order.
    pub methods: Vec<String>,
    /// Interactive retry policy.
    pub retry: RetryPolicy,
    /// Requests per drain tick.
    pub batch_size: usize,
    /// Session idle timeout in seconds.
    pub session_ttl_secs: u64,
    /// Delay before re-initializing after a system error.
    pub reinit_delay: Duration,
}

impl EngineSettings {
    /// Extract engine settings from the full configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_message_length: config.dispatch.max_message_length,
            methods: config.dispatch.methods.clone(),
            retry: RetryPolicy::once_after(Duration::from_millis(config.dispatch.retry_delay_ms)),
            batch_size: config.dispatch.batch_size,
            session_ttl_secs: config.maintenance.session_ttl_secs,
            reinit_delay: Duration::from_secs(config.dispatch.reinit_delay_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Overall engine health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Normal operation.
    Running,
    /// A system error occurred; a re-initialization may be pending.
    Degraded {
        /// Error that caused the degradation.
        reason: String,
    },
}

impl EngineStatus {
    /// Lower-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Degraded { .. } => "degraded",
        }
    }
}

/// Asynchronous notice for a user, delivered by the chat adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The single retry of a failed send finished.
    RetryFinished {
        /// User to notify.
        user_id: i64,
        /// Retry result.
        result: TransmissionResult,
    },
    /// A scheduled request was released onto the queue.
    ScheduledReleased {
        /// User to notify.
        user_id: i64,
        /// Released request id.
        request_id: String,
    },
}

/// What happened to a confirmed session.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReport {
    /// Delivered on the first attempt.
    Sent(TransmissionResult),
    /// First attempt failed; one retry is scheduled.
    RetryScheduled(TransmissionResult),
    /// Bulk requests placed on the queue.
    Queued {
        /// Number of requests queued.
        count: usize,
        /// Queue depth after enqueueing.
        depth: usize,
    },
    /// Request stored until its release time.
    Scheduled {
        /// Request id.
        id: String,
        /// Release time.
        at: DateTime<Utc>,
    },
}

/// Reply to one free-text turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnReply {
    /// No flow is active.
    NoSession,
    /// Input accepted; prompt for the next step.
    Prompt(Session),
    /// Input rejected; the step is unchanged.
    Rejected {
        /// Current step.
        step: Step,
        /// Reason shown to the user.
        reason: String,
    },
    /// Flow cancelled at the confirm step.
    Cancelled,
    /// Flow confirmed and dispatched.
    Dispatched(DispatchReport),
    /// Dispatch failed with a system error.
    Failed(String),
}

/// Status summary for the `/status` command and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Engine health.
    pub status: EngineStatus,
    /// Counters.
    pub stats: SystemStats,
    /// Live sessions.
    pub active_sessions: usize,
    /// Pending queue depth.
    pub queue_depth: usize,
    /// Scheduled requests waiting for release.
    pub scheduled: usize,
    /// Registered users.
    pub users: usize,
    /// Entries in the transmission log.
    pub logged_transmissions: usize,
}

/// Shared dispatch engine.
pub struct Engine {
    settings: EngineSettings,
    sessions: SessionManager,
    stats: Mutex<DispatchStats>,
    queue: DispatchQueue,
    rng: SharedRandom,
    transmitter: Arc<dyn Transmitter>,
    store: Arc<dyn LogStore>,
    status: StdMutex<EngineStatus>,
    reinit_pending: AtomicBool,
    notices: Option<mpsc::Sender<Notice>>,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine with an explicit transmitter and random source.
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn LogStore>,
        rng: SharedRandom,
        transmitter: Arc<dyn Transmitter>,
    ) -> Self {
        let started_at = Utc::now();
        Self {
            sessions: SessionManager::new(settings.max_message_length, settings.session_ttl_secs),
            queue: DispatchQueue::new(settings.batch_size),
            stats: Mutex::new(DispatchStats::new(started_at)),
            settings,
            rng,
            transmitter,
            store,
            status: StdMutex::new(EngineStatus::Running),
            reinit_pending: AtomicBool::new(false),
            notices: None,
            started_at,
        }
    }

    /// Engine backed by the [`SimulatedTransmitter`] sharing `rng`.
    pub fn simulated(
        settings: EngineSettings,
        store: Arc<dyn LogStore>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let rng: SharedRandom = Arc::new(StdMutex::new(rng));
        let transmitter = Arc::new(SimulatedTransmitter::new(Arc::clone(&rng)));
        Self::new(settings, store, rng, transmitter)
    }

    /// Engine built from configuration, seeded from `dispatch.seed` when set.
    pub fn from_config(config: &Config, store: Arc<dyn LogStore>) -> Self {
        let rng: Box<dyn RandomSource> = match config.dispatch.seed {
            Some(seed) => Box::new(SeededRandom::from_seed(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        };
        Self::simulated(EngineSettings::from_config(config), store, rng)
    }

    /// Attach a channel for asynchronous user notices.
    #[must_use]
    pub fn with_notices(mut self, tx: mpsc::Sender<Notice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Continue counting from the persisted counters, if any.
    pub async fn restore_stats(&self) {
        if let Some(saved) = self.store.load_stats().await {
            info!(total = saved.total, "restored dispatch counters");
            *self.stats.lock().await = DispatchStats::from_snapshot(saved);
        }
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Session manager.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Pending queue.
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Time the engine was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current counters.
    pub async fn stats(&self) -> SystemStats {
        self.stats.lock().await.snapshot()
    }

    /// Current health.
    pub fn status(&self) -> EngineStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_status(&self, status: EngineStatus) {
        match self.status.lock() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    // -----------------------------------------------------------------------
    // Conversation
    // -----------------------------------------------------------------------

    /// Register or refresh the user in the registry.
    pub async fn touch_user(&self, user_id: i64, display_name: &str) {
        if let Err(e) = self.store.touch_user(user_id, display_name, Utc::now()).await {
            warn!(user_id, error = %e, "failed to update user registry");
        }
    }

    /// Start a new flow, replacing any existing one.
    pub async fn start_flow(&self, user_id: i64, mode: Mode) -> Session {
        self.sessions.start(user_id, mode, Utc::now()).await
    }

    /// Discard the user's flow. Does not stop in-flight transmissions.
    pub async fn cancel(&self, user_id: i64) -> bool {
        self.sessions.cancel(user_id).await
    }

    /// Feed one free-text turn into the user's flow.
    ///
    /// At the single-message step, `#name` is replaced by the named template.
    pub async fn handle_text(self: &Arc<Self>, user_id: i64, text: &str) -> TurnReply {
        let text = self.expand_template(user_id, text).await;

        match self.sessions.handle_input(user_id, &text, Utc::now()).await {
            TurnOutcome::NoSession => TurnReply::NoSession,
            TurnOutcome::Advanced(session) => TurnReply::Prompt(session),
            TurnOutcome::Rejected { step, reason } => {
                debug!(user_id, ?step, %reason, "input rejected");
                TurnReply::Rejected { step, reason }
            }
            TurnOutcome::Cancelled => TurnReply::Cancelled,
            TurnOutcome::Confirmed(session) => match self.dispatch_session(&session).await {
                Ok(report) => TurnReply::Dispatched(report),
                Err(e) => {
                    error!(user_id, error = %e, "dispatch failed");
                    self.degrade_on_system_error(&e);
                    TurnReply::Failed(e.to_string())
                }
            },
        }
    }

    async fn expand_template(&self, user_id: i64, text: &str) -> String {
        let Some(name) = text.trim().strip_prefix('#') else {
            return text.to_owned();
        };
        let at_message_step = self
            .sessions
            .get(user_id)
            .await
            .is_some_and(|s| s.step == Step::AwaitingMessage);
        if !at_message_step {
            return text.to_owned();
        }
        self.store
            .templates()
            .await
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
            .map_or_else(|| text.to_owned(), |t| t.body)
    }

    /// Dispatch a confirmed session according to its mode.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::System`] when the pipeline or store faults.
    pub async fn dispatch_session(
        self: &Arc<Self>,
        session: &Session,
    ) -> Result<DispatchReport, DispatchError> {
        let mut requests = session.to_requests();
        match session.mode {
            Mode::Single => {
                let request = requests
                    .pop()
                    .ok_or_else(|| DispatchError::System("confirmed session is incomplete".to_owned()))?;
                self.dispatch_interactive(request).await
            }
            Mode::Bulk => {
                let count = requests.len();
                self.queue.enqueue_all(requests).await;
                let depth = self.queue.len().await;
                info!(user_id = session.user_id, count, depth, "bulk requests queued");
                Ok(DispatchReport::Queued { count, depth })
            }
            Mode::Scheduled => {
                let request = requests
                    .pop()
                    .ok_or_else(|| DispatchError::System("confirmed session is incomplete".to_owned()))?;
                let at = request
                    .scheduled_at
                    .ok_or_else(|| DispatchError::System("scheduled session has no time".to_owned()))?;
                let id = request.id.clone();
                self.store
                    .add_scheduled(ScheduledRequest {
                        request,
                        scheduled_at: at,
                    })
                    .await
                    .map_err(|e| DispatchError::System(e.to_string()))?;
                info!(user_id = session.user_id, id = %id, %at, "request scheduled");
                Ok(DispatchReport::Scheduled { id, at })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch pipeline
    // -----------------------------------------------------------------------

    /// Compute the profile for a request and pick its method.
    pub fn plan(&self, request: &TransmissionRequest) -> Result<(OptimizationProfile, String), DispatchError> {
        let profile = optimizer::compute_profile(&request.address, &request.message, Utc::now());
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| DispatchError::System("random source lock poisoned".to_owned()))?;
        let choice = optimizer::select_method(&profile, &self.settings.methods, &mut **rng);
        debug!(
            id = %request.id,
            method = %choice.method,
            score = choice.score,
            country = %profile.country,
            priority = profile.priority,
            "method selected"
        );
        Ok((profile, choice.method))
    }

    /// Run one attempt: optimize, transmit, count, and log.
    ///
    /// `retry_pending` marks a failed result as `RETRYING` instead of `FAILED`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::System`] if planning fails or the result
    /// cannot be logged. Counters are updated before logging.
    pub async fn process(
        &self,
        request: &TransmissionRequest,
        retry_pending: bool,
    ) -> Result<TransmissionResult, DispatchError> {
        let (profile, method) = self.plan(request)?;
        let mut result = self.transmitter.transmit(request, &method, &profile).await;
        if !result.success && retry_pending {
            result.status = TransmissionStatus::Retrying;
        }

        let (recorded, snapshot) = {
            let mut stats = self.stats.lock().await;
            let recorded = stats.record(&request.id, result.success);
            (recorded, stats.snapshot())
        };

        info!(
            id = %result.id,
            method = %result.method,
            status = result.status.as_str(),
            time_taken_ms = result.time_taken_ms,
            error = result.error.as_deref().unwrap_or(""),
            "transmission attempt"
        );

        if recorded == Recorded::New {
            if let Err(e) = self.store.add_user_sms(request.user_id, 1).await {
                warn!(user_id = request.user_id, error = %e, "failed to update user total");
            }
        }
        if let Err(e) = self.store.save_stats(&snapshot).await {
            warn!(error = %e, "failed to persist counters");
        }
        self.store
            .append_transmission(&result)
            .await
            .map_err(|e| DispatchError::System(format!("failed to log transmission: {e}")))?;

        Ok(result)
    }

    /// Send now; on failure schedule exactly one retry.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::System`] when [`Engine::process`] faults.
    pub async fn dispatch_interactive(
        self: &Arc<Self>,
        request: TransmissionRequest,
    ) -> Result<DispatchReport, DispatchError> {
        let retry_allowed = self.settings.retry.allows(0);
        let result = match self.process(&request, retry_allowed).await {
            Ok(result) => result,
            Err(e) => {
                self.stats.lock().await.finalize(&request.id);
                return Err(e);
            }
        };

        if result.success {
            self.stats.lock().await.finalize(&request.id);
            return Ok(DispatchReport::Sent(result));
        }

        if !retry_allowed {
            self.stats.lock().await.finalize(&request.id);
            return Ok(DispatchReport::Sent(result));
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.retry(request).await;
        });
        Ok(DispatchReport::RetryScheduled(result))
    }

    /// The single delayed retry. A failure here is terminal; a system fault
    /// degrades the engine.
    pub async fn retry(self: &Arc<Self>, request: TransmissionRequest) -> Option<TransmissionResult> {
        tokio::time::sleep(self.settings.retry.delay).await;
        debug!(id = %request.id, "retrying failed transmission");

        let outcome = self.process(&request, false).await;
        self.stats.lock().await.finalize(&request.id);

        match outcome {
            Ok(result) => {
                if result.success {
                    info!(id = %result.id, "retry delivered");
                } else {
                    warn!(id = %result.id, error = ?result.error, "retry failed, giving up");
                }
                self.notify(Notice::RetryFinished {
                    user_id: request.user_id,
                    result: result.clone(),
                })
                .await;
                Some(result)
            }
            Err(e) => {
                error!(id = %request.id, error = %e, "retry faulted");
                self.degrade_on_system_error(&e);
                None
            }
        }
    }

    /// Run one queue drain tick through the pipeline.
    ///
    /// A system fault on any request degrades the engine; the rest of the
    /// batch is still attempted.
    pub async fn drain_tick(self: &Arc<Self>) -> DrainOutcome {
        let outcome = self
            .queue
            .drain_tick(|request| async move {
                let result = self.process(&request, false).await;
                self.stats.lock().await.finalize(&request.id);
                if let Err(e) = &result {
                    self.degrade_on_system_error(e);
                }
                result
            })
            .await;
        if let DrainOutcome::Processed { taken, .. } = &outcome {
            if *taken > 0 {
                debug!(?outcome, "drain tick finished");
            }
        }
        outcome
    }

    /// Move scheduled requests due at `now` onto the queue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::System`] if the store cannot release them.
    pub async fn release_due_scheduled(&self, now: DateTime<Utc>) -> Result<usize, DispatchError> {
        let due = self
            .store
            .take_due_scheduled(now)
            .await
            .map_err(|e| DispatchError::System(e.to_string()))?;
        let count = due.len();
        for entry in due {
            let user_id = entry.request.user_id;
            let request_id = entry.request.id.clone();
            self.queue.enqueue(entry.request).await;
            self.notify(Notice::ScheduledReleased {
                user_id,
                request_id,
            })
            .await;
        }
        if count > 0 {
            info!(count, "scheduled requests released");
        }
        Ok(count)
    }

    async fn notify(&self, notice: Notice) {
        if let Some(tx) = &self.notices {
            if let Err(e) = tx.send(notice).await {
                warn!(error = %e, "failed to deliver notice");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status and recovery
    // -----------------------------------------------------------------------

    /// Snapshot for `/status`.
    pub async fn status_report(&self) -> StatusReport {
        StatusReport {
            status: self.status(),
            stats: self.stats().await,
            active_sessions: self.sessions.count().await,
            queue_depth: self.queue.len().await,
            scheduled: self.store.scheduled().await.len(),
            users: self.store.users().await.len(),
            logged_transmissions: self.store.transmission_count().await,
        }
    }

    /// Health sample for the health log.
    pub async fn health_sample(&self, now: DateTime<Utc>) -> HealthSample {
        let report = self.status_report().await;
        let uptime_secs = u64::try_from(now.signed_duration_since(self.started_at).num_seconds())
            .unwrap_or(0);
        HealthSample {
            timestamp: now,
            uptime_secs,
            status: report.status.as_str().to_owned(),
            active_sessions: report.active_sessions,
            queue_depth: report.queue_depth,
            total: report.stats.total,
            successful: report.stats.successful,
            failed: report.stats.failed,
            success_rate: report.stats.success_rate(),
        }
    }

    /// Templates available to `#name` shortcuts.
    pub async fn templates(&self) -> Vec<Template> {
        self.store.templates().await
    }

    /// Mark the engine degraded and schedule one delayed re-initialization.
    ///
    /// Further system errors while a re-initialization is pending only update
    /// the reason.
    pub fn enter_degraded(self: &Arc<Self>, cause: &DispatchError) {
        warn!(error = %cause, "engine degraded");
        self.set_status(EngineStatus::Degraded {
            reason: cause.to_string(),
        });

        if self
            .reinit_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.reinitialize().await;
        });
    }

    fn degrade_on_system_error(self: &Arc<Self>, error: &DispatchError) {
        if matches!(error, DispatchError::System(_)) {
            self.enter_degraded(error);
        }
    }

    /// Wait the configured delay, reload the store, and resume if it succeeds.
    pub async fn reinitialize(&self) -> bool {
        tokio::time::sleep(self.settings.reinit_delay).await;
        let recovered = match self.store.reload().await {
            Ok(()) => {
                self.set_status(EngineStatus::Running);
                info!("engine re-initialized");
                true
            }
            Err(e) => {
                error!(error = %e, "re-initialization failed, staying degraded");
                false
            }
        };
        self.reinit_pending.store(false, Ordering::Release);
        recovered
    }
}
