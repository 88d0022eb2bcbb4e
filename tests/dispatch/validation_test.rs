//! Address and message validation tests.

use courier::dispatch::validation::{
    country_of, detect_country, validate_address, validate_message, INTERNATIONAL,
    UNKNOWN_COUNTRY,
};
use courier::dispatch::DispatchError;

#[test]
fn pakistan_address_validates() {
    let valid = validate_address("+923001234567").expect("should validate");
    assert_eq!(valid.address, "+923001234567");
    assert_eq!(valid.country, "PAKISTAN");
}

#[test]
fn surrounding_whitespace_is_trimmed() {
    let valid = validate_address("  +923001234567\n").expect("should validate");
    assert_eq!(valid.address, "+923001234567");
}

#[test]
fn short_address_fails_with_format_error() {
    let err = validate_address("+440000000").expect_err("nine digits is too short");
    match err {
        DispatchError::Validation(msg) => assert!(msg.contains("Expected format")),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(country_of("+440000000"), UNKNOWN_COUNTRY);
}

#[test]
fn address_rules_reject_bad_shapes() {
    assert!(validate_address("923001234567").is_err(), "missing plus");
    assert!(validate_address("+023001234567").is_err(), "leading zero");
    assert!(validate_address("+92300123456789012").is_err(), "too long");
    assert!(validate_address("+92300-1234567").is_err(), "non-digit");
    assert!(validate_address("").is_err(), "empty");
}

#[test]
fn digit_count_bounds_are_inclusive() {
    // 11 and 15 digits after the plus.
    assert!(validate_address("+12345678901").is_ok());
    assert!(validate_address("+123456789012345").is_ok());
    assert!(validate_address("+1234567890").is_err());
    assert!(validate_address("+1234567890123456").is_err());
}

#[test]
fn longest_prefix_wins() {
    assert_eq!(detect_country("+12425551234"), "BAHAMAS");
    assert_eq!(detect_country("+18765551234"), "JAMAICA");
    assert_eq!(detect_country("+12125551234"), "USA");
    assert_eq!(detect_country("+9715012345678"), "UAE");
}

#[test]
fn unmatched_prefix_is_international() {
    assert_eq!(detect_country("+35312345678"), INTERNATIONAL);
    assert_eq!(country_of("+35312345678"), INTERNATIONAL);
}

#[test]
fn message_validation_checks_emptiness_and_length() {
    assert!(validate_message("Hello", 1000).is_ok());
    assert!(validate_message("   \n", 1000).is_err());
    assert!(validate_message(&"a".repeat(1000), 1000).is_ok());
    assert!(validate_message(&"a".repeat(1001), 1000).is_err());
}

#[test]
fn message_length_counts_characters_not_bytes() {
    let urdu = "سلام".repeat(250);
    assert_eq!(urdu.chars().count(), 1000);
    assert!(validate_message(&urdu, 1000).is_ok());
}
