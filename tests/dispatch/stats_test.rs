//! Per-request outcome accounting tests.

use chrono::Utc;
use courier::dispatch::stats::{DispatchStats, Recorded};

#[test]
fn first_outcome_counts_once() {
    let mut stats = DispatchStats::new(Utc::now());
    assert_eq!(stats.record("a", true), Recorded::New);
    assert_eq!(stats.record("b", false), Recorded::New);

    let snap = stats.snapshot();
    assert_eq!(snap.total, 2);
    assert_eq!(snap.successful, 1);
    assert_eq!(snap.failed, 1);
}

#[test]
fn retry_success_moves_failure_to_success() {
    let mut stats = DispatchStats::new(Utc::now());
    stats.record("a", false);
    assert_eq!(stats.record("a", true), Recorded::Recovered);

    let snap = stats.snapshot();
    assert_eq!(snap.total, 1);
    assert_eq!(snap.successful, 1);
    assert_eq!(snap.failed, 0);
}

#[test]
fn repeated_failure_is_unchanged() {
    let mut stats = DispatchStats::new(Utc::now());
    stats.record("a", false);
    assert_eq!(stats.record("a", false), Recorded::Unchanged);
    assert_eq!(stats.snapshot().failed, 1);
}

#[test]
fn interleaved_retries_keep_totals_consistent() {
    let mut stats = DispatchStats::new(Utc::now());
    stats.record("a", false);
    stats.record("b", false);
    stats.record("c", false);
    stats.record("b", true);
    stats.record("d", true);
    stats.record("a", false);

    let snap = stats.snapshot();
    assert_eq!(snap.total, 4);
    assert_eq!(snap.successful, 2);
    assert_eq!(snap.failed, 2);
    assert_eq!(snap.successful + snap.failed, snap.total);
}

#[test]
fn finalize_drops_ledger_entry() {
    let mut stats = DispatchStats::new(Utc::now());
    stats.record("a", false);
    assert_eq!(stats.tracked(), 1);
    stats.finalize("a");
    assert_eq!(stats.tracked(), 0);
}

#[test]
fn success_rate_is_a_percentage() {
    let mut stats = DispatchStats::new(Utc::now());
    assert!(stats.snapshot().success_rate().is_none());
    stats.record("a", true);
    stats.record("b", true);
    stats.record("c", true);
    stats.record("d", false);
    let rate = stats.snapshot().success_rate().expect("has requests");
    assert!((rate - 75.0).abs() < 1e-9);
}

#[test]
fn restored_snapshot_continues_counting() {
    let mut first = DispatchStats::new(Utc::now());
    first.record("a", true);
    let mut restored = DispatchStats::from_snapshot(first.snapshot());
    restored.record("b", false);
    let snap = restored.snapshot();
    assert_eq!(snap.total, 2);
    assert_eq!(snap.start_time, first.snapshot().start_time);
}
