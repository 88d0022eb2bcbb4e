//! Config loading from disk and token lookup.

use courier::config::{bot_token, load_config, load_or_default, TelegramConfig};
use courier::dispatch::DispatchError;

#[test]
fn missing_file_falls_back_to_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config = load_or_default(&tmp.path().join("config.toml")).expect("defaults");
    assert_eq!(config.dispatch.batch_size, 10);
    assert!(config.telegram.allowed_users.is_empty());
}

#[test]
fn malformed_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[dispatch]\nbatch_size = \"ten\"\n").expect("write config");

    let err = load_config(&path).expect_err("wrong type should fail");
    assert!(err.to_string().contains("failed to parse config"));
    assert!(load_or_default(&path).is_err());
}

#[test]
fn file_values_override_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[maintenance]\nsession_ttl_secs = 60\n").expect("write config");

    let config = load_config(&path).expect("should load");
    assert_eq!(config.maintenance.session_ttl_secs, 60);
    assert_eq!(config.maintenance.gc_interval_secs, 60);
}

#[test]
fn unset_token_variable_is_an_init_error() {
    let config = TelegramConfig {
        bot_token_env: "COURIER_CONFIG_TEST_UNSET_TOKEN".to_owned(),
        allowed_users: Vec::new(),
    };
    match bot_token(&config) {
        Err(DispatchError::Init(message)) => {
            assert!(message.contains("COURIER_CONFIG_TEST_UNSET_TOKEN"));
        }
        other => panic!("expected init error, got {other:?}"),
    }
}
