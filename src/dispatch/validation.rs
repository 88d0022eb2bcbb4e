//! Stateless address and message validation.
//!
//! Addresses use E.164-like form: a leading `+`, a non-zero first digit, then
//! 10 to 14 more digits. Country detection is a longest-prefix match over a
//! fixed table.

use std::sync::LazyLock;

use regex::Regex;

use super::DispatchError;

/// Country label returned for addresses that fail validation.
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

/// Country label returned for valid addresses with no prefix in the table.
pub const INTERNATIONAL: &str = "INTERNATIONAL";

/// Default maximum message length in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;

/// Expected address format, quoted in validation errors.
pub const ADDRESS_FORMAT_HINT: &str = "+<country code><number>, 11 to 15 digits, e.g. +923001234567";

static ADDRESS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{10,14}$").ok());

/// Calling-code prefixes, in table order. Overlapping prefixes are resolved by
/// longest match, not by position.
const COUNTRY_PREFIXES: &[(&str, &str)] = &[
    ("+1", "USA"),
    ("+1242", "BAHAMAS"),
    ("+1876", "JAMAICA"),
    ("+7", "RUSSIA"),
    ("+20", "EGYPT"),
    ("+27", "SOUTH_AFRICA"),
    ("+33", "FRANCE"),
    ("+44", "UK"),
    ("+49", "GERMANY"),
    ("+52", "MEXICO"),
    ("+55", "BRAZIL"),
    ("+61", "AUSTRALIA"),
    ("+81", "JAPAN"),
    ("+86", "CHINA"),
    ("+90", "TURKEY"),
    ("+91", "INDIA"),
    ("+92", "PAKISTAN"),
    ("+93", "AFGHANISTAN"),
    ("+98", "IRAN"),
    ("+234", "NIGERIA"),
    ("+880", "BANGLADESH"),
    ("+966", "SAUDI_ARABIA"),
    ("+971", "UAE"),
];

/// A validated destination address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAddress {
    /// Normalized address (surrounding whitespace removed).
    pub address: String,
    /// Detected country label.
    pub country: &'static str,
}

/// Validate an address and detect its country.
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] naming the expected format when the
/// address does not match.
pub fn validate_address(input: &str) -> Result<ValidAddress, DispatchError> {
    let address = input.trim();
    let matches = ADDRESS_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(address));

    if !matches {
        return Err(DispatchError::Validation(format!(
            "Invalid address. Expected format: {ADDRESS_FORMAT_HINT}"
        )));
    }

    Ok(ValidAddress {
        address: address.to_owned(),
        country: detect_country(address),
    })
}

/// Country for an address, or [`UNKNOWN_COUNTRY`] when it does not validate.
pub fn country_of(input: &str) -> &'static str {
    validate_address(input).map_or(UNKNOWN_COUNTRY, |valid| valid.country)
}

/// Longest-prefix match over the calling-code table.
///
/// Returns [`INTERNATIONAL`] when no prefix matches. Does not validate the
/// rest of the address.
pub fn detect_country(address: &str) -> &'static str {
    COUNTRY_PREFIXES
        .iter()
        .filter(|(prefix, _)| address.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map_or(INTERNATIONAL, |(_, country)| country)
}

/// Validate a message body against emptiness and the length limit.
///
/// Length is measured in characters, not bytes.
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] for empty or over-long messages.
pub fn validate_message(message: &str, max_length: usize) -> Result<(), DispatchError> {
    if message.trim().is_empty() {
        return Err(DispatchError::Validation(
            "Message cannot be empty.".to_owned(),
        ));
    }

    let length = message.chars().count();
    if length > max_length {
        return Err(DispatchError::Validation(format!(
            "Message too long: {length} characters (maximum {max_length})."
        )));
    }

    Ok(())
}
