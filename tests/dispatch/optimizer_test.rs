//! Optimizer profile and method scoring tests.

use chrono::{TimeZone, Utc};
use courier::dispatch::optimizer::{
    classify_encoding, compute_profile, delivery_window, part_count, priority, score_methods,
    select_method, split_message, success_probability, EncodingClass, DEFAULT_METHODS,
    MAX_SUCCESS_PROBABILITY,
};
use courier::dispatch::random::{FixedRandom, SeededRandom};

fn methods() -> Vec<String> {
    DEFAULT_METHODS.iter().map(|m| (*m).to_owned()).collect()
}

#[test]
fn pakistan_hello_profile() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid time");
    let profile = compute_profile("+923001234567", "Hello", now);

    assert_eq!(profile.country, "PAKISTAN");
    assert_eq!(profile.message_length, 5);
    assert_eq!(profile.part_count, 1);
    assert_eq!(profile.encoding, EncodingClass::Gsm7Bit);
    assert!((profile.priority - 1.2).abs() < 1e-9);
    assert_eq!(profile.route, "QUANTUM_PAKISTAN_HUB");
    assert!((profile.success_probability - 0.9575).abs() < 1e-3);
    assert!(profile.is_domestic());
}

#[test]
fn message_of_350_chars_has_three_parts() {
    assert_eq!(part_count(350), 3);
    assert_eq!(part_count(160), 1);
    assert_eq!(part_count(161), 2);
    assert_eq!(part_count(0), 0);
}

#[test]
fn split_reproduces_input() {
    let message: String = "abcdefghij".repeat(35);
    let parts = split_message(&message);
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.chars().count() <= 160));
    assert_eq!(parts.concat(), message);
}

#[test]
fn split_respects_multibyte_characters() {
    let message = "é".repeat(200);
    let parts = split_message(&message);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].chars().count(), 160);
    assert_eq!(parts.concat(), message);
}

#[test]
fn encoding_classes() {
    assert_eq!(classify_encoding("plain ascii"), EncodingClass::Gsm7Bit);
    assert_eq!(classify_encoding("café"), EncodingClass::GsmExtended);
    assert_eq!(classify_encoding("سلام"), EncodingClass::Unicode);
}

#[test]
fn urgency_keywords_raise_priority_and_cap_at_three() {
    assert!((priority("INDIA", "hello") - 1.0).abs() < 1e-9);
    assert!((priority("INDIA", "URGENT please") - 1.5).abs() < 1e-9);
    let all = priority("PAKISTAN", "urgent emergency asap immediately");
    assert!((all - 3.0).abs() < 1e-9);
}

#[test]
fn success_probability_is_capped() {
    assert!((success_probability("USA") - MAX_SUCCESS_PROBABILITY).abs() < 1e-9);
    let unknown = success_probability("INTERNATIONAL");
    assert!((unknown - (0.85 * 0.85 + 0.10)).abs() < 1e-9);
}

#[test]
fn delivery_windows_by_hour() {
    assert_eq!(delivery_window(3), "OPTIMAL_NIGHT_WINDOW");
    assert_eq!(delivery_window(15), "PEAK_AVOIDANCE_WINDOW");
    assert_eq!(delivery_window(9), "STANDARD_WINDOW");
}

#[test]
fn zero_jitter_selection_is_deterministic_and_prefers_earlier_on_tie() {
    let profile = compute_profile("+923001234567", "Hello", Utc::now());
    let mut rng = FixedRandom::succeeding();

    let scores = score_methods(&profile, &methods(), &mut rng);
    let quantum = scores.iter().find(|s| s.method == "QUANTUM_ENCRYPTED").expect("scored");
    let direct = scores.iter().find(|s| s.method == "DIRECT_CARRIER").expect("scored");
    assert!((quantum.score - 0.9).abs() < 1e-9);
    assert!((direct.score - 0.9).abs() < 1e-9);

    for _ in 0..5 {
        let choice = select_method(&profile, &methods(), &mut rng);
        assert_eq!(choice.method, "QUANTUM_ENCRYPTED");
    }

    let reordered = vec!["DIRECT_CARRIER".to_owned(), "QUANTUM_ENCRYPTED".to_owned()];
    assert_eq!(select_method(&profile, &reordered, &mut rng).method, "DIRECT_CARRIER");
}

#[test]
fn scores_stay_in_unit_range_with_jitter() {
    let profile = compute_profile("+12125551234", &"urgent ".repeat(40), Utc::now());
    let mut rng = SeededRandom::from_seed(42);
    for _ in 0..200 {
        for score in score_methods(&profile, &methods(), &mut rng) {
            assert!((0.0..=1.0).contains(&score.score), "{} out of range", score.score);
        }
    }
}

#[test]
fn empty_method_list_falls_back_to_defaults() {
    let profile = compute_profile("+923001234567", "Hello", Utc::now());
    let scores = score_methods(&profile, &[], &mut FixedRandom::succeeding());
    assert_eq!(scores.len(), DEFAULT_METHODS.len());
}

#[test]
fn unknown_method_scores_baseline() {
    let profile = compute_profile("+923001234567", "Hello", Utc::now());
    let scores = score_methods(&profile, &["CARRIER_PIGEON".to_owned()], &mut FixedRandom::succeeding());
    assert!((scores[0].score - 0.5).abs() < 1e-9);
}
