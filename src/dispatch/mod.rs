//! Dispatch pipeline: validation, method optimization, simulated transmission,
//! queueing with retry, and outcome accounting.
//!
//! A [`TransmissionRequest`] flows through the [`optimizer`] to pick a delivery
//! method, then through a [`executor::Transmitter`] which always produces a
//! [`TransmissionResult`]. Counters are kept in [`stats::DispatchStats`].

pub mod executor;
pub mod optimizer;
pub mod queue;
pub mod random;
pub mod stats;
pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced along the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Malformed address or message. Recoverable; the session step is unchanged.
    #[error("{0}")]
    Validation(String),
    /// Simulated delivery failed.
    #[error("transmission failed: {0}")]
    Transmission(String),
    /// Unexpected fault inside the pipeline.
    #[error("system error: {0}")]
    System(String),
    /// A required external dependency is missing at startup.
    #[error("initialization failed: {0}")]
    Init(String),
}

/// One outbound message waiting to be transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionRequest {
    /// Unique request identifier.
    pub id: String,
    /// Destination address in `+<country><number>` form.
    pub address: String,
    /// Message body.
    pub message: String,
    /// User who composed the request.
    pub user_id: i64,
    /// Time the request should be released, for scheduled sends.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl TransmissionRequest {
    /// Create a request with a fresh v4 id.
    pub fn new(user_id: i64, address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            address: address.into(),
            message: message.into(),
            user_id,
            scheduled_at: None,
        }
    }
}

/// Lifecycle status of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionStatus {
    /// Accepted, not yet attempted.
    Pending,
    /// Handed to the carrier.
    Sent,
    /// Confirmed delivered.
    Delivered,
    /// Terminal failure.
    Failed,
    /// Failed once; a retry is scheduled.
    Retrying,
}

impl TransmissionStatus {
    /// Upper-case label used in logs and replies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
        }
    }
}

/// Descriptor of the encryption envelope applied before delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    /// Envelope identifier.
    pub envelope_id: String,
    /// Algorithm tag.
    pub algorithm: String,
    /// Key size in bits.
    pub key_size: u32,
    /// Rolling polynomial hash of the message body, hex encoded.
    pub content_hash: String,
    /// Time the envelope was produced.
    pub created_at: DateTime<Utc>,
}

/// Outcome of one transmission attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionResult {
    /// Id of the request this result belongs to.
    pub id: String,
    /// Whether delivery succeeded.
    pub success: bool,
    /// Method used for delivery.
    pub method: String,
    /// Route label.
    pub route: String,
    /// Network label derived from the address prefix.
    pub network: String,
    /// Simulated signal strength in percent.
    pub signal_strength: u8,
    /// Wall-clock time spent, in milliseconds.
    pub time_taken_ms: u64,
    /// Final status of this attempt.
    pub status: TransmissionStatus,
    /// Error text for failed attempts.
    pub error: Option<String>,
    /// Destination address.
    pub address: String,
    /// Detected country of the destination.
    pub country: String,
    /// Envelope descriptor, absent if the attempt failed before it was built.
    pub envelope: Option<EncryptionEnvelope>,
    /// Simulated entanglement flag.
    pub entangled: bool,
    /// Time the result was produced.
    pub timestamp: DateTime<Utc>,
}

impl TransmissionResult {
    /// Build a failure result that carries only the error text.
    pub fn failure(request: &TransmissionRequest, method: &str, error: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            success: false,
            method: method.to_owned(),
            route: String::new(),
            network: String::new(),
            signal_strength: 0,
            time_taken_ms: 0,
            status: TransmissionStatus::Failed,
            error: Some(error.into()),
            address: request.address.clone(),
            country: validation::detect_country(&request.address).to_owned(),
            envelope: None,
            entangled: false,
            timestamp: Utc::now(),
        }
    }
}
