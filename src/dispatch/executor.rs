//! Transmission executor: the delivery boundary of the dispatch pipeline.
//!
//! [`Transmitter`] is the seam a real carrier client plugs into. The
//! [`SimulatedTransmitter`] wraps the message in an envelope descriptor,
//! waits a method-specific latency, and draws the outcome from the injected
//! random source. Callers always receive a [`TransmissionResult`]; internal
//! faults come back as `FAILED` results, never as errors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::optimizer::OptimizationProfile;
use super::random::RandomSource;
use super::{
    DispatchError, EncryptionEnvelope, TransmissionRequest, TransmissionResult,
    TransmissionStatus,
};

/// Random source shared between the optimizer and the executor.
pub type SharedRandom = Arc<Mutex<Box<dyn RandomSource>>>;

/// Network used when no prefix in the table matches.
pub const DEFAULT_NETWORK: &str = "GLOBAL_AI_NETWORK";

/// Latency used for methods missing from the table.
pub const DEFAULT_LATENCY_MS: u64 = 800;

const METHOD_LATENCY_MS: &[(&str, u64)] = &[
    ("QUANTUM_ENCRYPTED", 1200),
    ("DIRECT_CARRIER", 400),
    ("AI_OPTIMIZED_ROUTE", 600),
    ("SATELLITE_RELAY", 1000),
    ("MESH_NETWORK", 800),
];

const NETWORK_PREFIXES: &[(&str, &str)] = &[
    ("+92", "PK_QUANTUM_GRID"),
    ("+91", "IN_NEURAL_MESH"),
    ("+1", "NA_CARRIER_BACKBONE"),
    ("+44", "EU_SECURE_FABRIC"),
    ("+49", "EU_SECURE_FABRIC"),
    ("+971", "GULF_SAT_LINK"),
    ("+966", "GULF_SAT_LINK"),
    ("+86", "APAC_FIBER_RING"),
];

const ROUTE_SEGMENTS: &[&str] = &[
    "ALPHA_RELAY",
    "BETA_TUNNEL",
    "GAMMA_BRIDGE",
    "DELTA_SWITCH",
    "EPSILON_LINK",
    "OMEGA_GATEWAY",
];

/// Delivery backend.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Deliver `request` via `method`. Never fails; failures are encoded in the result.
    async fn transmit(
        &self,
        request: &TransmissionRequest,
        method: &str,
        profile: &OptimizationProfile,
    ) -> TransmissionResult;
}

/// Simulated carrier with fixed per-method latency.
pub struct SimulatedTransmitter {
    rng: SharedRandom,
}

impl std::fmt::Debug for SimulatedTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTransmitter").finish_non_exhaustive()
    }
}

impl SimulatedTransmitter {
    /// Create a simulator drawing from `rng`.
    pub fn new(rng: SharedRandom) -> Self {
        Self { rng }
    }

    async fn attempt(
        &self,
        request: &TransmissionRequest,
        method: &str,
        profile: &OptimizationProfile,
    ) -> Result<TransmissionResult, DispatchError> {
        let started = tokio::time::Instant::now();
        let envelope = build_envelope(method, &request.message);

        tokio::time::sleep(method_latency(method)).await;

        let (segment, signal_strength, entangled, delivered) = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| DispatchError::System("random source lock poisoned".to_owned()))?;
            let segment = ROUTE_SEGMENTS
                .get(rng.index(ROUTE_SEGMENTS.len()))
                .copied()
                .unwrap_or(ROUTE_SEGMENTS[0]);
            let signal = u8::try_from(rng.index(41))
                .unwrap_or(0)
                .saturating_add(60);
            let entangled = rng.unit() < 0.5;
            let delivered = rng.unit() < profile.success_probability;
            (segment, signal, entangled, delivered)
        };

        let time_taken_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (status, error) = if delivered {
            (TransmissionStatus::Delivered, None)
        } else {
            (
                TransmissionStatus::Failed,
                Some(format!("carrier rejected delivery via {method}")),
            )
        };

        Ok(TransmissionResult {
            id: request.id.clone(),
            success: delivered,
            method: method.to_owned(),
            route: format!("{}::{segment}", profile.route),
            network: network_for(&request.address).to_owned(),
            signal_strength,
            time_taken_ms,
            status,
            error,
            address: request.address.clone(),
            country: profile.country.clone(),
            envelope: Some(envelope),
            entangled,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl Transmitter for SimulatedTransmitter {
    async fn transmit(
        &self,
        request: &TransmissionRequest,
        method: &str,
        profile: &OptimizationProfile,
    ) -> TransmissionResult {
        match self.attempt(request, method, profile).await {
            Ok(result) => {
                debug!(
                    id = %result.id,
                    method,
                    status = result.status.as_str(),
                    time_taken_ms = result.time_taken_ms,
                    "simulated transmission finished"
                );
                result
            }
            Err(e) => {
                warn!(id = %request.id, method, error = %e, "simulated transmission faulted");
                TransmissionResult::failure(request, method, e.to_string())
            }
        }
    }
}

/// Simulated latency for a method.
pub fn method_latency(method: &str) -> Duration {
    let millis = METHOD_LATENCY_MS
        .iter()
        .find(|(name, _)| *name == method)
        .map_or(DEFAULT_LATENCY_MS, |(_, ms)| *ms);
    Duration::from_millis(millis)
}

/// Network label for an address, by longest matching prefix.
pub fn network_for(address: &str) -> &'static str {
    NETWORK_PREFIXES
        .iter()
        .filter(|(prefix, _)| address.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map_or(DEFAULT_NETWORK, |(_, network)| network)
}

/// Rolling polynomial hash (base 31, wrapping) over the message characters.
pub fn content_hash(message: &str) -> u32 {
    message
        .chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(u32::from(c)))
}

/// Envelope descriptor for a method and message.
pub fn build_envelope(method: &str, message: &str) -> EncryptionEnvelope {
    let (algorithm, key_size) = match method {
        "QUANTUM_ENCRYPTED" => ("KYBER-1024", 1024),
        "SATELLITE_RELAY" => ("CHACHA20-POLY1305", 256),
        _ => ("AES-256-GCM", 256),
    };

    EncryptionEnvelope {
        envelope_id: Uuid::new_v4().to_string(),
        algorithm: algorithm.to_owned(),
        key_size,
        content_hash: format!("{:08x}", content_hash(message)),
        created_at: Utc::now(),
    }
}
