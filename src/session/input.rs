//! Parsers for the free-text inputs of the bulk, scheduled and confirm steps.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::dispatch::validation::{self, ValidAddress};
use crate::dispatch::DispatchError;

/// Maximum destinations in one bulk send.
pub const MAX_BULK_ADDRESSES: usize = 50;

/// Accepted schedule time format (UTC).
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// `Some(true)` to send, `Some(false)` to cancel, `None` if unrecognized.
pub fn parse_confirmation(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "send" | "confirm" => Some(true),
        "no" | "n" | "cancel" => Some(false),
        _ => None,
    }
}

/// Parse a comma, whitespace or newline separated address list.
///
/// Every entry must validate; duplicates are dropped keeping the first.
///
/// # Errors
///
/// Rejects empty lists, lists over [`MAX_BULK_ADDRESSES`], and names the first
/// invalid entry.
pub fn parse_bulk_addresses(text: &str) -> Result<Vec<ValidAddress>, DispatchError> {
    let mut addresses: Vec<ValidAddress> = Vec::new();

    for entry in text
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        let valid = validation::validate_address(entry).map_err(|_| {
            DispatchError::Validation(format!(
                "Invalid address in list: {entry}. Expected format: {}",
                validation::ADDRESS_FORMAT_HINT
            ))
        })?;
        if !addresses.iter().any(|a| a.address == valid.address) {
            addresses.push(valid);
        }
    }

    if addresses.is_empty() {
        return Err(DispatchError::Validation(
            "Send at least one address.".to_owned(),
        ));
    }
    if addresses.len() > MAX_BULK_ADDRESSES {
        return Err(DispatchError::Validation(format!(
            "Too many addresses: {} (maximum {MAX_BULK_ADDRESSES}).",
            addresses.len()
        )));
    }
    Ok(addresses)
}

/// Parse bulk message lines against `address_count` destinations.
///
/// One line is broadcast to every address; exactly `address_count` lines are
/// paired in order.
///
/// # Errors
///
/// Rejects any other line count and any line failing message validation.
pub fn parse_bulk_messages(
    text: &str,
    address_count: usize,
    max_length: usize,
) -> Result<Vec<String>, DispatchError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    for line in &lines {
        validation::validate_message(line, max_length)?;
    }

    match lines.len() {
        0 => Err(DispatchError::Validation(
            "Message cannot be empty.".to_owned(),
        )),
        1 => Ok(vec![lines.concat(); address_count]),
        n if n == address_count => Ok(lines.into_iter().map(str::to_owned).collect()),
        n => Err(DispatchError::Validation(format!(
            "Got {n} messages for {address_count} addresses. Send one message for all, or one per address."
        ))),
    }
}

/// Parse a `YYYY-MM-DD HH:MM` UTC time strictly after `now`.
///
/// # Errors
///
/// Rejects malformed and non-future times.
pub fn parse_schedule_time(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DispatchError> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), SCHEDULE_FORMAT).map_err(|_| {
        DispatchError::Validation("Invalid time. Expected format: YYYY-MM-DD HH:MM (UTC).".to_owned())
    })?;
    let at = naive.and_utc();
    if at <= now {
        return Err(DispatchError::Validation(
            "Scheduled time must be in the future.".to_owned(),
        ));
    }
    Ok(at)
}

/// Parse `<address> <message>` for a scheduled send.
///
/// # Errors
///
/// Rejects a missing message, an invalid address, or an invalid message.
pub fn parse_schedule_message(
    text: &str,
    max_length: usize,
) -> Result<(ValidAddress, String), DispatchError> {
    let trimmed = text.trim();
    let (address, message) = trimmed.split_once(char::is_whitespace).ok_or_else(|| {
        DispatchError::Validation("Send the address followed by the message.".to_owned())
    })?;

    let valid = validation::validate_address(address)?;
    let message = message.trim();
    validation::validate_message(message, max_length)?;
    Ok((valid, message.to_owned()))
}
