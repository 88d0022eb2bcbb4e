//! Telegram slash command handlers.
//!
//! Each function handles a specific command and returns an HTML-formatted
//! response string.

use crate::config::Config;
use crate::engine::Engine;
use crate::session::Mode;
use crate::store::Template;
use crate::telegram::ui::{self, escape_html};

/// Split `/cmd@bot args` into `("cmd", "args")`. `None` if not a command.
pub fn parse_command(text: &str) -> Option<(&str, &str)> {
    let without_slash = text.strip_prefix('/')?;
    let (full_command, args) = match without_slash.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (without_slash, ""),
    };
    let command = full_command.split('@').next().unwrap_or(full_command);
    Some((command, args))
}

/// List all available commands.
pub fn handle_help() -> String {
    [
        "<b>Available commands:</b>",
        "",
        "/send — send one message",
        "/bulk — send to many addresses",
        "/schedule — send at a future time (UTC)",
        "/templates — list templates",
        "/templates &lt;name&gt; &lt;text&gt; — save a template",
        "/status — counters, queue and sessions",
        "/settings — current dispatch settings",
        "/cancel — abandon the current flow",
        "/help — show this message",
    ]
    .join("\n")
}

/// Greeting for `/start`.
pub fn handle_start(display_name: &str) -> String {
    format!(
        "Hello, {}! I dispatch messages through the fastest available route.\n\n{}",
        escape_html(display_name),
        handle_help()
    )
}

/// Start a flow and return its first prompt.
pub async fn handle_flow(engine: &Engine, user_id: i64, mode: Mode) -> String {
    let session = engine.start_flow(user_id, mode).await;
    ui::prompt_for(&session)
}

/// Discard the user's flow.
pub async fn handle_cancel(engine: &Engine, user_id: i64) -> String {
    if engine.cancel(user_id).await {
        "Cancelled.".to_owned()
    } else {
        "Nothing to cancel.".to_owned()
    }
}

/// List templates, or save one when `args` is `<name> <body>`.
pub async fn handle_templates(engine: &Engine, args: &str) -> String {
    if args.is_empty() {
        return ui::format_templates(&engine.templates().await);
    }

    let Some((name, body)) = args.split_once(char::is_whitespace) else {
        return "Usage: /templates &lt;name&gt; &lt;text&gt;".to_owned();
    };
    let name = name.trim_start_matches('#');
    let body = body.trim();
    if name.is_empty() || body.is_empty() {
        return "Usage: /templates &lt;name&gt; &lt;text&gt;".to_owned();
    }

    match engine
        .store()
        .save_template(Template {
            name: name.to_owned(),
            body: body.to_owned(),
        })
        .await
    {
        Ok(()) => format!("Template <code>#{}</code> saved.", escape_html(name)),
        Err(e) => format!("Failed to save template: {}", escape_html(&e.to_string())),
    }
}

/// Show counters, queue depth and sessions.
pub async fn handle_status(engine: &Engine) -> String {
    ui::format_status(&engine.status_report().await)
}

/// Show the effective dispatch settings.
pub fn handle_settings(config: &Config) -> String {
    let d = &config.dispatch;
    format!(
        "<b>Settings</b>\nMax length: {}\nMethods: {}\nRetry delay: {} ms\nBatch size: {}\nDrain interval: {} ms\nSession timeout: {} s",
        d.max_message_length,
        escape_html(&d.methods.join(", ")),
        d.retry_delay_ms,
        d.batch_size,
        d.drain_interval_ms,
        config.maintenance.session_ttl_secs,
    )
}
