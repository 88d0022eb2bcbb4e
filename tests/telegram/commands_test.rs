//! Slash command parsing and handler tests.

use std::sync::Arc;

use courier::config::Config;
use courier::dispatch::random::FixedRandom;
use courier::engine::{Engine, EngineSettings};
use courier::session::Mode;
use courier::store::{LogStore, MemoryStore};
use courier::telegram::commands::{
    handle_cancel, handle_flow, handle_help, handle_settings, handle_status, handle_templates,
    parse_command,
};
use courier::telegram::is_allowed;

fn engine() -> Engine {
    Engine::simulated(
        EngineSettings::default(),
        Arc::new(MemoryStore::default()) as Arc<dyn LogStore>,
        Box::new(FixedRandom::succeeding()),
    )
}

#[test]
fn parse_command_splits_name_and_args() {
    assert_eq!(parse_command("/send"), Some(("send", "")));
    assert_eq!(
        parse_command("/templates promo  Big sale"),
        Some(("templates", "promo  Big sale"))
    );
    assert_eq!(parse_command("/status@courier_bot"), Some(("status", "")));
    assert_eq!(parse_command("hello"), None);
}

#[test]
fn empty_allow_list_admits_everyone() {
    assert!(is_allowed(&[], 5));
    assert!(is_allowed(&[5, 6], 6));
    assert!(!is_allowed(&[5, 6], 7));
}

#[test]
fn help_lists_every_command() {
    let help = handle_help();
    for command in ["/send", "/bulk", "/schedule", "/templates", "/status", "/settings", "/cancel", "/help"] {
        assert!(help.contains(command), "{command} missing from help");
    }
}

#[tokio::test]
async fn flow_prompt_and_cancel() {
    let engine = engine();
    assert_eq!(handle_cancel(&engine, 1).await, "Nothing to cancel.");

    let prompt = handle_flow(&engine, 1, Mode::Bulk).await;
    assert!(prompt.contains("addresses"));
    assert_eq!(engine.sessions().count().await, 1);

    assert_eq!(handle_cancel(&engine, 1).await, "Cancelled.");
    assert_eq!(engine.sessions().count().await, 0);
}

#[tokio::test]
async fn templates_list_and_save() {
    let engine = engine();
    let listing = handle_templates(&engine, "").await;
    assert!(listing.contains("#greeting"));

    let reply = handle_templates(&engine, "#promo Big sale today").await;
    assert_eq!(reply, "Template <code>#promo</code> saved.");
    assert!(engine
        .templates()
        .await
        .iter()
        .any(|t| t.name == "promo" && t.body == "Big sale today"));

    let usage = handle_templates(&engine, "lonely").await;
    assert!(usage.starts_with("Usage"));
}

#[tokio::test]
async fn status_and_settings_render() {
    let engine = engine();
    let status = handle_status(&engine).await;
    assert!(status.contains("running"));
    assert!(status.contains("Success rate: n/a"));

    let settings = handle_settings(&Config::default());
    assert!(settings.contains("Max length"));
    assert!(settings.contains("QUANTUM_ENCRYPTED"));
}
