//! Transmission optimizer: derives an [`OptimizationProfile`] for a request
//! and scores the configured delivery methods against it.
//!
//! Everything here is a pure function of its inputs except the score jitter,
//! which is drawn from an injected [`RandomSource`].

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::random::RandomSource;
use super::validation;

/// Characters per message part.
pub const PART_LENGTH: usize = 160;

/// Upper bound for the computed priority.
pub const MAX_PRIORITY: f64 = 3.0;

/// Upper bound for the computed success probability.
pub const MAX_SUCCESS_PROBABILITY: f64 = 0.99;

/// Country that counts as domestic for method bonuses.
pub const HOME_COUNTRY: &str = "PAKISTAN";

/// Route used when the country has no dedicated hub.
pub const DEFAULT_ROUTE: &str = "DEFAULT_AI_ROUTE";

/// Each distinct keyword found multiplies priority by [`URGENCY_MULTIPLIER`].
const URGENCY_KEYWORDS: &[&str] = &["urgent", "emergency", "asap", "immediately"];
const URGENCY_MULTIPLIER: f64 = 1.5;

const DEFAULT_PRIORITY_WEIGHT: f64 = 1.0;
const PRIORITY_WEIGHTS: &[(&str, f64)] = &[
    ("PAKISTAN", 1.2),
    ("USA", 1.1),
    ("UK", 1.1),
    ("UAE", 1.1),
    ("SAUDI_ARABIA", 1.05),
    ("INDIA", 1.0),
];

const DEFAULT_RELIABILITY_WEIGHT: f64 = 0.85;
const RELIABILITY_WEIGHTS: &[(&str, f64)] = &[
    ("PAKISTAN", 1.0088),
    ("USA", 1.05),
    ("UK", 1.04),
    ("GERMANY", 1.03),
    ("UAE", 1.02),
    ("INDIA", 0.95),
    ("CHINA", 0.92),
];

const ROUTES: &[(&str, &str)] = &[
    ("PAKISTAN", "QUANTUM_PAKISTAN_HUB"),
    ("USA", "QUANTUM_AMERICAS_HUB"),
    ("UK", "QUANTUM_EUROPE_HUB"),
    ("GERMANY", "QUANTUM_EUROPE_HUB"),
    ("FRANCE", "QUANTUM_EUROPE_HUB"),
    ("INDIA", "QUANTUM_SOUTH_ASIA_HUB"),
    ("BANGLADESH", "QUANTUM_SOUTH_ASIA_HUB"),
    ("UAE", "QUANTUM_GULF_HUB"),
    ("SAUDI_ARABIA", "QUANTUM_GULF_HUB"),
    ("CHINA", "QUANTUM_EAST_ASIA_HUB"),
    ("JAPAN", "QUANTUM_EAST_ASIA_HUB"),
];

/// Built-in method list, in tie-break order.
pub const DEFAULT_METHODS: &[&str] = &[
    "QUANTUM_ENCRYPTED",
    "DIRECT_CARRIER",
    "AI_OPTIMIZED_ROUTE",
    "SATELLITE_RELAY",
    "MESH_NETWORK",
];

/// Character set class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncodingClass {
    /// Only code points up to 0x7F.
    Gsm7Bit,
    /// Some code point in 0x80..=0xFF, none above.
    GsmExtended,
    /// Some code point above 0xFF.
    Unicode,
}

impl EncodingClass {
    /// Upper-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gsm7Bit => "GSM_7BIT",
            Self::GsmExtended => "GSM_EXTENDED",
            Self::Unicode => "UNICODE",
        }
    }
}

/// Delivery metrics derived from an address and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProfile {
    /// Detected country.
    pub country: String,
    /// Message length in characters.
    pub message_length: usize,
    /// Number of 160-character parts.
    pub part_count: usize,
    /// Character set class.
    pub encoding: EncodingClass,
    /// Delivery priority in `[0, 3]`.
    pub priority: f64,
    /// Route label.
    pub route: String,
    /// Time-of-day window label.
    pub window: &'static str,
    /// Estimated success probability in `[0, 0.99]`.
    pub success_probability: f64,
}

impl OptimizationProfile {
    /// Whether the destination is in [`HOME_COUNTRY`].
    pub fn is_domestic(&self) -> bool {
        self.country == HOME_COUNTRY
    }
}

/// Score assigned to one method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodScore {
    /// Method name.
    pub method: String,
    /// Score in `[0, 1]`.
    pub score: f64,
}

/// Compute the optimization profile for a request at time `now`.
pub fn compute_profile(address: &str, message: &str, now: DateTime<Utc>) -> OptimizationProfile {
    let country = validation::detect_country(address);
    let message_length = message.chars().count();

    OptimizationProfile {
        country: country.to_owned(),
        message_length,
        part_count: part_count(message_length),
        encoding: classify_encoding(message),
        priority: priority(country, message),
        route: route_for(country).to_owned(),
        window: delivery_window(now.hour()),
        success_probability: success_probability(country),
    }
}

/// Number of parts for a message of `length` characters: `ceil(length / 160)`.
pub fn part_count(length: usize) -> usize {
    length.div_ceil(PART_LENGTH)
}

/// Split a message into contiguous chunks of at most 160 characters.
///
/// Concatenating the chunks reproduces the input exactly.
pub fn split_message(message: &str) -> Vec<String> {
    let chars: Vec<char> = message.chars().collect();
    chars
        .chunks(PART_LENGTH)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Classify the message character set.
pub fn classify_encoding(message: &str) -> EncodingClass {
    let widest = message.chars().map(u32::from).max().unwrap_or(0);
    if widest > 0xFF {
        EncodingClass::Unicode
    } else if widest > 0x7F {
        EncodingClass::GsmExtended
    } else {
        EncodingClass::Gsm7Bit
    }
}

/// Priority from the country weight and urgency keywords, capped at 3.0.
pub fn priority(country: &str, message: &str) -> f64 {
    let lowered = message.to_lowercase();
    let weight = lookup(PRIORITY_WEIGHTS, country).unwrap_or(DEFAULT_PRIORITY_WEIGHT);

    let boosted = URGENCY_KEYWORDS
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .fold(weight, |acc, _| acc * URGENCY_MULTIPLIER);

    boosted.min(MAX_PRIORITY)
}

/// Route label for a country.
pub fn route_for(country: &str) -> &'static str {
    ROUTES
        .iter()
        .find(|(name, _)| *name == country)
        .map_or(DEFAULT_ROUTE, |(_, route)| route)
}

/// Time-of-day window for an hour in `0..24`.
pub fn delivery_window(hour: u32) -> &'static str {
    match hour {
        1..=5 => "OPTIMAL_NIGHT_WINDOW",
        13..=17 => "PEAK_AVOIDANCE_WINDOW",
        _ => "STANDARD_WINDOW",
    }
}

/// `min(0.99, 0.85 * weight + 0.10)`.
pub fn success_probability(country: &str) -> f64 {
    let weight = lookup(RELIABILITY_WEIGHTS, country).unwrap_or(DEFAULT_RELIABILITY_WEIGHT);
    (0.85 * weight + 0.10).clamp(0.0, MAX_SUCCESS_PROBABILITY)
}

/// Unconditional bonus for a method.
fn base_bonus(method: &str) -> f64 {
    match method {
        "QUANTUM_ENCRYPTED" => 0.4,
        "DIRECT_CARRIER" => 0.3,
        "AI_OPTIMIZED_ROUTE" => 0.25,
        "SATELLITE_RELAY" => 0.15,
        "MESH_NETWORK" => 0.1,
        _ => 0.0,
    }
}

/// Profile-dependent bonus for a method.
fn conditional_bonus(method: &str, profile: &OptimizationProfile) -> f64 {
    match method {
        "DIRECT_CARRIER" if profile.is_domestic() => 0.1,
        "AI_OPTIMIZED_ROUTE" if profile.priority >= 1.5 => 0.15,
        "SATELLITE_RELAY" if !profile.is_domestic() => 0.1,
        "MESH_NETWORK" if profile.part_count > 1 => 0.1,
        _ => 0.0,
    }
}

/// Score every method: `0.5 + base + conditional + jitter`, clamped to `[0, 1]`.
///
/// An empty `methods` slice scores [`DEFAULT_METHODS`] instead.
pub fn score_methods(
    profile: &OptimizationProfile,
    methods: &[String],
    rng: &mut dyn RandomSource,
) -> Vec<MethodScore> {
    let names: Vec<String> = if methods.is_empty() {
        DEFAULT_METHODS.iter().map(|m| (*m).to_owned()).collect()
    } else {
        methods.to_vec()
    };

    names
        .into_iter()
        .map(|method| {
            let raw =
                0.5 + base_bonus(&method) + conditional_bonus(&method, profile) + rng.jitter();
            MethodScore {
                score: raw.clamp(0.0, 1.0),
                method,
            }
        })
        .collect()
}

/// Pick the highest-scoring method; ties go to the earlier entry.
pub fn select_method(
    profile: &OptimizationProfile,
    methods: &[String],
    rng: &mut dyn RandomSource,
) -> MethodScore {
    let scores = score_methods(profile, methods, rng);
    let mut best: Option<MethodScore> = None;
    for candidate in scores {
        match best {
            Some(ref current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best.unwrap_or_else(|| MethodScore {
        method: DEFAULT_METHODS[0].to_owned(),
        score: 0.5,
    })
}

fn lookup(table: &[(&str, f64)], country: &str) -> Option<f64> {
    table
        .iter()
        .find(|(name, _)| *name == country)
        .map(|(_, weight)| *weight)
}
