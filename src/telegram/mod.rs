//! Telegram adapter: UI formatting, slash commands, and bot dispatcher.
//!
//! Thin glue between teloxide and the [`Engine`]: commands start or cancel
//! flows, free text is fed to the user's session, and the inline confirm and
//! cancel buttons behave like typing `yes` or `no`.

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{Engine, Notice};
use crate::session::Mode;

pub mod commands;
pub mod ui;

// ---------------------------------------------------------------------------
// Shared state for handler injection
// ---------------------------------------------------------------------------

/// Shared dependencies injected into teloxide handlers via `dptree::deps!`.
#[derive(Clone)]
struct SharedState {
    config: Arc<Config>,
    engine: Arc<Engine>,
}

/// Whether `user_id` may use the bot. An empty list allows everyone.
pub fn is_allowed(allowed_users: &[i64], user_id: i64) -> bool {
    allowed_users.is_empty() || allowed_users.contains(&user_id)
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run the Telegram bot adapter.
///
/// Starts the outbound notice sender and the dispatcher for messages and
/// callback queries. Blocks until the bot is stopped (Ctrl+C).
///
/// # Errors
///
/// Currently infallible once the dispatcher starts; kept fallible for startup.
pub async fn run_telegram(
    bot_token: &str,
    config: Arc<Config>,
    engine: Arc<Engine>,
    mut notices_rx: mpsc::Receiver<Notice>,
) -> anyhow::Result<()> {
    let bot = Bot::new(bot_token);

    let outbound_bot = bot.clone();
    let _outbound_handle = tokio::spawn(async move {
        while let Some(notice) = notices_rx.recv().await {
            let (user_id, text) = ui::format_notice(&notice);
            if let Err(e) = outbound_bot
                .send_message(ChatId(user_id), text)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(user_id, error = %e, "failed to send telegram notice");
            }
        }
    });

    let shared = SharedState { config, engine };

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![shared])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

async fn handle_message(bot: Bot, msg: Message, state: SharedState) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    // teloxide uses u64 for user IDs; the config stores i64.
    let user_id = i64::try_from(user.id.0).unwrap_or(0);

    if !is_allowed(&state.config.telegram.allowed_users, user_id) {
        warn!(user_id, "message dropped: user not in allowed_users");
        return Ok(());
    }

    let Some(text) = msg.text() else {
        debug!(user_id, "non-text message ignored");
        return Ok(());
    };

    let display_name = user.full_name();
    state.engine.touch_user(user_id, &display_name).await;

    if let Some((command, args)) = commands::parse_command(text) {
        let reply = dispatch_command(command, args, &state, user_id, &display_name).await;
        bot.send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    }

    let turn = state.engine.handle_text(user_id, text).await;
    let (reply, keyboard) = ui::format_turn(&turn);
    let mut req = bot.send_message(msg.chat.id, reply).parse_mode(ParseMode::Html);
    if let Some(keyboard) = keyboard {
        req = req.reply_markup(keyboard);
    }
    req.await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatcher
// ---------------------------------------------------------------------------

async fn dispatch_command(
    command: &str,
    args: &str,
    state: &SharedState,
    user_id: i64,
    display_name: &str,
) -> String {
    let engine = &state.engine;
    match command {
        "start" => commands::handle_start(display_name),
        "help" => commands::handle_help(),
        "send" => commands::handle_flow(engine, user_id, Mode::Single).await,
        "bulk" => commands::handle_flow(engine, user_id, Mode::Bulk).await,
        "schedule" => commands::handle_flow(engine, user_id, Mode::Scheduled).await,
        "templates" => commands::handle_templates(engine, args).await,
        "status" => commands::handle_status(engine).await,
        "settings" => commands::handle_settings(&state.config),
        "cancel" => commands::handle_cancel(engine, user_id).await,
        _ => format!("Unknown command: /{}", ui::escape_html(command)),
    }
}

// ---------------------------------------------------------------------------
// Callback query handler
// ---------------------------------------------------------------------------

/// Inline confirm/cancel buttons feed `yes`/`no` into the session.
async fn handle_callback(bot: Bot, query: CallbackQuery, state: SharedState) -> ResponseResult<()> {
    let user_id = i64::try_from(query.from.id.0).unwrap_or(0);

    if !is_allowed(&state.config.telegram.allowed_users, user_id) {
        bot.answer_callback_query(&query.id).await?;
        return Ok(());
    }

    let answer = match query.data.as_deref() {
        Some(ui::CONFIRM_CALLBACK) => "yes",
        Some(ui::CANCEL_CALLBACK) => "no",
        _ => {
            bot.answer_callback_query(&query.id)
                .text("Unknown action")
                .await?;
            return Ok(());
        }
    };

    bot.answer_callback_query(&query.id).await?;

    let turn = state.engine.handle_text(user_id, answer).await;
    let (reply, _) = ui::format_turn(&turn);
    bot.send_message(ChatId(user_id), reply)
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(())
}
