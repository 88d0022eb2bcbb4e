//! Tests for `src/logging.rs`.

use courier::logging::{default_directive, LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn verbose_enables_crate_debug() {
    assert_eq!(default_directive(false), "info");
    assert_eq!(default_directive(true), "info,courier=debug");
}

#[test]
fn log_file_prefix_names_the_crate() {
    assert!(LOG_FILE_PREFIX.starts_with("courier"));
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // The global subscriber may already be installed by another test; the
    // directory is created before that can fail.
    let _result = courier::logging::init_production(&logs_dir, false);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_cli_twice_is_harmless() {
    courier::logging::init_cli(false);
    courier::logging::init_cli(true);
}
