//! HTML formatting and inline keyboard helpers for Telegram messages.
//!
//! All output uses HTML parse mode (never MarkdownV2).

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::dispatch::TransmissionResult;
use crate::engine::{DispatchReport, Notice, StatusReport, TurnReply};
use crate::session::{Mode, Session, Step};
use crate::store::Template;

/// Callback data of the confirm button.
pub const CONFIRM_CALLBACK: &str = "confirm";
/// Callback data of the cancel button.
pub const CANCEL_CALLBACK: &str = "cancel";

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Inline keyboard with Send and Cancel buttons for the confirm step.
pub fn confirm_keyboard() -> InlineKeyboardMarkup {
    let confirm = InlineKeyboardButton::callback("\u{2705} Send".to_owned(), CONFIRM_CALLBACK);
    let cancel = InlineKeyboardButton::callback("\u{274C} Cancel".to_owned(), CANCEL_CALLBACK);
    InlineKeyboardMarkup::new(vec![vec![confirm, cancel]])
}

/// Prompt for the session's current step.
pub fn prompt_for(session: &Session) -> String {
    match session.step {
        Step::AwaitingAddress => {
            "Send the destination address, e.g. <code>+923001234567</code>.".to_owned()
        }
        Step::AwaitingMessage => format!(
            "Destination: <code>{}</code> ({})\nNow send the message, or <code>#name</code> for a template.",
            escape_html(session.address.as_deref().unwrap_or("")),
            escape_html(session.country.as_deref().unwrap_or("")),
        ),
        Step::AwaitingBulkAddresses => {
            "Send the addresses separated by commas, spaces or new lines.".to_owned()
        }
        Step::AwaitingBulkMessages => format!(
            "{} addresses accepted.\nSend one message for all of them, or one line per address.",
            session.bulk_addresses.len()
        ),
        Step::AwaitingScheduleTime => {
            "Send the release time as <code>YYYY-MM-DD HH:MM</code> (UTC).".to_owned()
        }
        Step::AwaitingScheduleMessage => {
            "Send the address followed by the message, e.g. <code>+923001234567 Hello</code>."
                .to_owned()
        }
        Step::ConfirmSend => format_confirmation(session),
    }
}

/// Summary shown at the confirm step.
pub fn format_confirmation(session: &Session) -> String {
    match session.mode {
        Mode::Single | Mode::Scheduled => {
            let mut out = format!(
                "<b>Confirm send</b>\nTo: <code>{}</code> ({})\nParts: {}\nMessage:\n<pre>{}</pre>",
                escape_html(session.address.as_deref().unwrap_or("")),
                escape_html(session.country.as_deref().unwrap_or("")),
                session.message_parts,
                escape_html(session.message.as_deref().unwrap_or("")),
            );
            if let Some(at) = session.scheduled_at {
                out.push_str(&format!("\nRelease: {}", at.format("%Y-%m-%d %H:%M UTC")));
            }
            out.push_str("\n\nReply <b>yes</b> to send or <b>no</b> to cancel.");
            out
        }
        Mode::Bulk => format!(
            "<b>Confirm bulk send</b>\nAddresses: {}\nMessages: {}\n\nReply <b>yes</b> to send or <b>no</b> to cancel.",
            session.bulk_addresses.len(),
            session.bulk_messages.len(),
        ),
    }
}

/// One-line summary of a transmission result.
pub fn format_result(result: &TransmissionResult) -> String {
    let mut out = format!(
        "<b>{}</b> via {}\nRoute: <code>{}</code>\nNetwork: {} · signal {}%\nTime: {} ms",
        result.status.as_str(),
        escape_html(&result.method),
        escape_html(&result.route),
        escape_html(&result.network),
        result.signal_strength,
        result.time_taken_ms,
    );
    if let Some(error) = &result.error {
        out.push_str(&format!("\nError: {}", escape_html(error)));
    }
    out
}

/// Reply for a dispatched session.
pub fn format_report(report: &DispatchReport) -> String {
    match report {
        DispatchReport::Sent(result) => format_result(result),
        DispatchReport::RetryScheduled(result) => format!(
            "{}\n\nOne retry is scheduled.",
            format_result(result)
        ),
        DispatchReport::Queued { count, depth } => {
            format!("<b>Queued</b> {count} messages. Queue depth: {depth}.")
        }
        DispatchReport::Scheduled { id, at } => format!(
            "<b>Scheduled</b> for {}\nId: <code>{}</code>",
            at.format("%Y-%m-%d %H:%M UTC"),
            escape_html(id),
        ),
    }
}

/// `/status` body.
pub fn format_status(report: &StatusReport) -> String {
    let rate = report
        .stats
        .success_rate()
        .map_or_else(|| "n/a".to_owned(), |r| format!("{r:.1}%"));
    format!(
        "<b>Status</b>: {}\nSent: {} (ok {}, failed {})\nSuccess rate: {rate}\nSessions: {}\nQueue: {}\nScheduled: {}\nUsers: {}\nLogged: {}\nSince: {}",
        report.status.as_str(),
        report.stats.total,
        report.stats.successful,
        report.stats.failed,
        report.active_sessions,
        report.queue_depth,
        report.scheduled,
        report.users,
        report.logged_transmissions,
        report.stats.start_time.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// `/templates` body.
pub fn format_templates(templates: &[Template]) -> String {
    if templates.is_empty() {
        return "No templates.".to_owned();
    }
    let mut out = "<b>Templates</b> (use <code>#name</code> as the message)\n".to_owned();
    for t in templates {
        out.push_str(&format!(
            "\n<code>#{}</code> {}",
            escape_html(&t.name),
            escape_html(&t.body)
        ));
    }
    out
}

/// Reply text for a free-text turn, with the confirm keyboard when the flow
/// reached the confirm step.
pub fn format_turn(reply: &TurnReply) -> (String, Option<InlineKeyboardMarkup>) {
    match reply {
        TurnReply::NoSession => (
            "No active flow. Use /send, /bulk or /schedule to start one.".to_owned(),
            None,
        ),
        TurnReply::Prompt(session) => {
            let keyboard = (session.step == Step::ConfirmSend).then(confirm_keyboard);
            (prompt_for(session), keyboard)
        }
        TurnReply::Rejected { reason, .. } => (escape_html(reason), None),
        TurnReply::Cancelled => ("Cancelled. Nothing was sent.".to_owned(), None),
        TurnReply::Dispatched(report) => (format_report(report), None),
        TurnReply::Failed(error) => (
            format!(
                "Something went wrong: {}\nThe service will recover shortly.",
                escape_html(error)
            ),
            None,
        ),
    }
}

/// Message for an asynchronous notice, addressed to its user.
pub fn format_notice(notice: &Notice) -> (i64, String) {
    match notice {
        Notice::RetryFinished { user_id, result } => (
            *user_id,
            format!("<b>Retry finished</b>\n{}", format_result(result)),
        ),
        Notice::ScheduledReleased {
            user_id,
            request_id,
        } => (
            *user_id,
            format!(
                "Scheduled message <code>{}</code> released for sending.",
                escape_html(request_id)
            ),
        ),
    }
}
