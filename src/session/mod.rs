//! Per-user conversation state.
//!
//! Each user has at most one [`Session`]. Starting a flow overwrites any
//! existing session (last write wins). Every read and write goes through the
//! [`SessionManager`] lock, so turns for the same user and the garbage
//! collector never interleave inside a transition.

pub mod input;

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::dispatch::validation::{self, ValidAddress};
use crate::dispatch::{optimizer, DispatchError, TransmissionRequest};

/// Idle time after which a session is purged.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Which flow a session is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// One address, one message.
    Single,
    /// Many addresses, broadcast or paired messages.
    Bulk,
    /// One address and message released at a future time.
    Scheduled,
}

/// Position of a session within its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Single: waiting for the destination address.
    AwaitingAddress,
    /// Single: waiting for the message body.
    AwaitingMessage,
    /// Bulk: waiting for the address list.
    AwaitingBulkAddresses,
    /// Bulk: waiting for the message lines.
    AwaitingBulkMessages,
    /// Scheduled: waiting for the release time.
    AwaitingScheduleTime,
    /// Scheduled: waiting for `<address> <message>`.
    AwaitingScheduleMessage,
    /// Every mode: waiting for yes/no.
    ConfirmSend,
}

impl Mode {
    /// First step of the flow.
    pub fn initial_step(self) -> Step {
        match self {
            Self::Single => Step::AwaitingAddress,
            Self::Bulk => Step::AwaitingBulkAddresses,
            Self::Scheduled => Step::AwaitingScheduleTime,
        }
    }

    /// Successor of `step` in this mode's graph, `None` at the last step or
    /// for steps that do not belong to the mode.
    pub fn next_step(self, step: Step) -> Option<Step> {
        match (self, step) {
            (Self::Single, Step::AwaitingAddress) => Some(Step::AwaitingMessage),
            (Self::Single, Step::AwaitingMessage) => Some(Step::ConfirmSend),
            (Self::Bulk, Step::AwaitingBulkAddresses) => Some(Step::AwaitingBulkMessages),
            (Self::Bulk, Step::AwaitingBulkMessages) => Some(Step::ConfirmSend),
            (Self::Scheduled, Step::AwaitingScheduleTime) => Some(Step::AwaitingScheduleMessage),
            (Self::Scheduled, Step::AwaitingScheduleMessage) => Some(Step::ConfirmSend),
            _ => None,
        }
    }

    /// Lower-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Bulk => "bulk",
            Self::Scheduled => "scheduled",
        }
    }
}

/// One user's in-progress flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Owner.
    pub user_id: i64,
    /// Flow kind.
    pub mode: Mode,
    /// Current step.
    pub step: Step,
    /// Single/scheduled destination.
    pub address: Option<String>,
    /// Country of `address`.
    pub country: Option<String>,
    /// Single/scheduled body.
    pub message: Option<String>,
    /// Number of 160-character parts in `message`.
    pub message_parts: usize,
    /// Bulk destinations.
    pub bulk_addresses: Vec<String>,
    /// Bulk bodies, one per destination after pairing.
    pub bulk_messages: Vec<String>,
    /// Scheduled release time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Flow start.
    pub created_at: DateTime<Utc>,
    /// Last accepted or attempted input.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session at the first step of `mode`.
    pub fn new(user_id: i64, mode: Mode, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            mode,
            step: mode.initial_step(),
            address: None,
            country: None,
            message: None,
            message_parts: 0,
            bulk_addresses: Vec::new(),
            bulk_messages: Vec::new(),
            scheduled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to the next step of this session's mode.
    fn advance(&mut self) -> Result<Step, DispatchError> {
        let next = self.mode.next_step(self.step).ok_or_else(|| {
            DispatchError::System(format!(
                "no transition from {:?} in {} mode",
                self.step,
                self.mode.as_str()
            ))
        })?;
        self.step = next;
        Ok(next)
    }

    fn set_destination(&mut self, valid: ValidAddress) {
        self.address = Some(valid.address);
        self.country = Some(valid.country.to_owned());
    }

    fn set_message(&mut self, message: String) {
        self.message_parts = optimizer::part_count(message.chars().count());
        self.message = Some(message);
    }

    /// Requests this session produces once confirmed.
    pub fn to_requests(&self) -> Vec<TransmissionRequest> {
        match self.mode {
            Mode::Single | Mode::Scheduled => match (&self.address, &self.message) {
                (Some(address), Some(message)) => {
                    let mut request = TransmissionRequest::new(self.user_id, address, message);
                    request.scheduled_at = self.scheduled_at;
                    vec![request]
                }
                _ => Vec::new(),
            },
            Mode::Bulk => self
                .bulk_addresses
                .iter()
                .zip(self.bulk_messages.iter())
                .map(|(address, message)| TransmissionRequest::new(self.user_id, address, message))
                .collect(),
        }
    }
}

/// Outcome of feeding one free-text turn into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The user has no active session.
    NoSession,
    /// Input accepted; the session moved to `session.step`.
    Advanced(Session),
    /// Input rejected; the step is unchanged.
    Rejected {
        /// Step the session remains at.
        step: Step,
        /// User-facing reason.
        reason: String,
    },
    /// User confirmed; the session was removed and should be dispatched.
    Confirmed(Session),
    /// User declined at the confirm step; the session was removed.
    Cancelled,
}

/// Owner of every user's session.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<i64, Session>>,
    max_message_length: usize,
    ttl: ChronoDuration,
}

impl SessionManager {
    /// Manager enforcing `max_message_length` and purging after `ttl_secs` idle.
    pub fn new(max_message_length: usize, ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_message_length,
            ttl: ChronoDuration::try_seconds(ttl_secs).unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Start `mode` for `user_id`, replacing any existing session.
    pub async fn start(&self, user_id: i64, mode: Mode, now: DateTime<Utc>) -> Session {
        let session = Session::new(user_id, mode, now);
        let replaced = self
            .sessions
            .lock()
            .await
            .insert(user_id, session.clone())
            .is_some();
        debug!(user_id, mode = mode.as_str(), replaced, "session started");
        session
    }

    /// Remove the user's session. Returns whether one existed.
    pub async fn cancel(&self, user_id: i64) -> bool {
        let removed = self.sessions.lock().await.remove(&user_id).is_some();
        debug!(user_id, removed, "session cancelled");
        removed
    }

    /// Copy of the user's session.
    pub async fn get(&self, user_id: i64) -> Option<Session> {
        self.sessions.lock().await.get(&user_id).cloned()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Apply one free-text turn to the user's session.
    pub async fn handle_input(&self, user_id: i64, text: &str, now: DateTime<Utc>) -> TurnOutcome {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&user_id) else {
            return TurnOutcome::NoSession;
        };
        session.updated_at = now;

        if text.trim().eq_ignore_ascii_case("cancel") {
            sessions.remove(&user_id);
            return TurnOutcome::Cancelled;
        }

        if session.step == Step::ConfirmSend {
            return match input::parse_confirmation(text) {
                Some(true) => sessions
                    .remove(&user_id)
                    .map_or(TurnOutcome::NoSession, TurnOutcome::Confirmed),
                Some(false) => {
                    sessions.remove(&user_id);
                    TurnOutcome::Cancelled
                }
                None => TurnOutcome::Rejected {
                    step: Step::ConfirmSend,
                    reason: "Reply yes to send or no to cancel.".to_owned(),
                },
            };
        }

        let step = session.step;
        match self.apply(session, text, now) {
            Ok(()) => match session.advance() {
                Ok(_) => TurnOutcome::Advanced(session.clone()),
                Err(e) => TurnOutcome::Rejected {
                    step,
                    reason: e.to_string(),
                },
            },
            Err(e) => TurnOutcome::Rejected {
                step,
                reason: e.to_string(),
            },
        }
    }

    /// Validate `text` for the session's current step and store the fields.
    /// Leaves the session untouched on error.
    fn apply(&self, session: &mut Session, text: &str, now: DateTime<Utc>) -> Result<(), DispatchError> {
        match session.step {
            Step::AwaitingAddress => {
                let valid = validation::validate_address(text)?;
                session.set_destination(valid);
            }
            Step::AwaitingMessage => {
                validation::validate_message(text, self.max_message_length)?;
                session.set_message(text.to_owned());
            }
            Step::AwaitingBulkAddresses => {
                let addresses = input::parse_bulk_addresses(text)?;
                session.bulk_addresses = addresses.into_iter().map(|a| a.address).collect();
            }
            Step::AwaitingBulkMessages => {
                let messages = input::parse_bulk_messages(
                    text,
                    session.bulk_addresses.len(),
                    self.max_message_length,
                )?;
                session.bulk_messages = messages;
            }
            Step::AwaitingScheduleTime => {
                session.scheduled_at = Some(input::parse_schedule_time(text, now)?);
            }
            Step::AwaitingScheduleMessage => {
                let (valid, message) =
                    input::parse_schedule_message(text, self.max_message_length)?;
                session.set_destination(valid);
                session.set_message(message);
            }
            Step::ConfirmSend => {}
        }
        Ok(())
    }

    /// Remove every session idle for longer than the TTL. Silent to users.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, session| {
            now.signed_duration_since(session.updated_at) <= ttl
        });
        let purged = before.saturating_sub(sessions.len());
        if purged > 0 {
            info!(purged, remaining = sessions.len(), "expired sessions purged");
        }
        purged
    }
}
