//! Conversation state machine tests.

use chrono::{Duration, Utc};
use courier::session::{Mode, SessionManager, Step, TurnOutcome};

fn manager() -> SessionManager {
    SessionManager::new(1000, 300)
}

fn advanced(outcome: TurnOutcome) -> courier::session::Session {
    match outcome {
        TurnOutcome::Advanced(session) => session,
        other => panic!("expected Advanced, got {other:?}"),
    }
}

#[tokio::test]
async fn single_flow_reaches_confirm_and_dispatches() {
    let sessions = manager();
    let now = Utc::now();
    let started = sessions.start(1, Mode::Single, now).await;
    assert_eq!(started.step, Step::AwaitingAddress);

    let s = advanced(sessions.handle_input(1, "+923001234567", now).await);
    assert_eq!(s.step, Step::AwaitingMessage);
    assert_eq!(s.country.as_deref(), Some("PAKISTAN"));

    let s = advanced(sessions.handle_input(1, "Hello", now).await);
    assert_eq!(s.step, Step::ConfirmSend);
    assert_eq!(s.message_parts, 1);

    match sessions.handle_input(1, "yes", now).await {
        TurnOutcome::Confirmed(session) => {
            let requests = session.to_requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].address, "+923001234567");
            assert_eq!(requests[0].message, "Hello");
            assert_eq!(requests[0].user_id, 1);
        }
        other => panic!("expected Confirmed, got {other:?}"),
    }
    assert!(sessions.get(1).await.is_none(), "session removed after confirm");
}

#[tokio::test]
async fn invalid_address_keeps_step() {
    let sessions = manager();
    let now = Utc::now();
    sessions.start(1, Mode::Single, now).await;

    match sessions.handle_input(1, "+440000000", now).await {
        TurnOutcome::Rejected { step, reason } => {
            assert_eq!(step, Step::AwaitingAddress);
            assert!(reason.contains("Expected format"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    let session = sessions.get(1).await.expect("still active");
    assert_eq!(session.step, Step::AwaitingAddress);
    assert!(session.address.is_none());
}

#[tokio::test]
async fn too_long_message_is_rejected() {
    let sessions = SessionManager::new(10, 300);
    let now = Utc::now();
    sessions.start(1, Mode::Single, now).await;
    sessions.handle_input(1, "+923001234567", now).await;

    let outcome = sessions.handle_input(1, "this is far too long", now).await;
    assert!(matches!(
        outcome,
        TurnOutcome::Rejected {
            step: Step::AwaitingMessage,
            ..
        }
    ));
}

#[tokio::test]
async fn no_at_confirm_cancels() {
    let sessions = manager();
    let now = Utc::now();
    sessions.start(1, Mode::Single, now).await;
    sessions.handle_input(1, "+923001234567", now).await;
    sessions.handle_input(1, "Hello", now).await;

    assert_eq!(sessions.handle_input(1, "No", now).await, TurnOutcome::Cancelled);
    assert_eq!(sessions.count().await, 0);
}

#[tokio::test]
async fn typed_cancel_ends_the_flow_at_any_step() {
    let sessions = manager();
    let now = Utc::now();

    sessions.start(1, Mode::Single, now).await;
    assert_eq!(sessions.handle_input(1, "cancel", now).await, TurnOutcome::Cancelled);

    sessions.start(2, Mode::Bulk, now).await;
    sessions.handle_input(2, "+923001234567 +447911123456", now).await;
    assert_eq!(sessions.handle_input(2, " Cancel ", now).await, TurnOutcome::Cancelled);

    sessions.start(3, Mode::Scheduled, now).await;
    assert_eq!(sessions.handle_input(3, "CANCEL", now).await, TurnOutcome::Cancelled);

    assert_eq!(sessions.count().await, 0);
}

#[tokio::test]
async fn unrecognized_confirmation_keeps_session() {
    let sessions = manager();
    let now = Utc::now();
    sessions.start(1, Mode::Single, now).await;
    sessions.handle_input(1, "+923001234567", now).await;
    sessions.handle_input(1, "Hello", now).await;

    let outcome = sessions.handle_input(1, "maybe", now).await;
    assert!(matches!(
        outcome,
        TurnOutcome::Rejected {
            step: Step::ConfirmSend,
            ..
        }
    ));
    assert_eq!(sessions.count().await, 1);
}

#[tokio::test]
async fn text_without_session_is_ignored() {
    let sessions = manager();
    assert_eq!(
        sessions.handle_input(9, "hello", Utc::now()).await,
        TurnOutcome::NoSession
    );
}

#[tokio::test]
async fn starting_a_flow_overwrites_existing_session() {
    let sessions = manager();
    let now = Utc::now();
    sessions.start(1, Mode::Single, now).await;
    sessions.handle_input(1, "+923001234567", now).await;

    let fresh = sessions.start(1, Mode::Bulk, now).await;
    assert_eq!(fresh.step, Step::AwaitingBulkAddresses);
    assert_eq!(sessions.count().await, 1);
    let stored = sessions.get(1).await.expect("session");
    assert_eq!(stored.mode, Mode::Bulk);
    assert!(stored.address.is_none());
}

#[tokio::test]
async fn bulk_flow_pairs_messages() {
    let sessions = manager();
    let now = Utc::now();
    sessions.start(1, Mode::Bulk, now).await;

    let s = advanced(
        sessions
            .handle_input(1, "+923001234567, +447911123456", now)
            .await,
    );
    assert_eq!(s.bulk_addresses.len(), 2);
    assert_eq!(s.step, Step::AwaitingBulkMessages);

    let s = advanced(sessions.handle_input(1, "first\nsecond", now).await);
    assert_eq!(s.step, Step::ConfirmSend);

    let TurnOutcome::Confirmed(session) = sessions.handle_input(1, "send", now).await else {
        panic!("expected confirmation");
    };
    let requests = session.to_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].address, "+923001234567");
    assert_eq!(requests[0].message, "first");
    assert_eq!(requests[1].address, "+447911123456");
    assert_eq!(requests[1].message, "second");
    assert_ne!(requests[0].id, requests[1].id);
}

#[tokio::test]
async fn scheduled_flow_carries_release_time() {
    let sessions = manager();
    let now = Utc::now();
    let at = (now + Duration::days(1)).format("%Y-%m-%d %H:%M").to_string();
    sessions.start(1, Mode::Scheduled, now).await;

    let s = advanced(sessions.handle_input(1, &at, now).await);
    assert_eq!(s.step, Step::AwaitingScheduleMessage);
    assert!(s.scheduled_at.is_some());

    let s = advanced(
        sessions
            .handle_input(1, "+923001234567 see you tomorrow", now)
            .await,
    );
    assert_eq!(s.step, Step::ConfirmSend);
    assert_eq!(s.message.as_deref(), Some("see you tomorrow"));

    let TurnOutcome::Confirmed(session) = sessions.handle_input(1, "yes", now).await else {
        panic!("expected confirmation");
    };
    let requests = session.to_requests();
    assert_eq!(requests[0].scheduled_at, session.scheduled_at);
}

#[tokio::test]
async fn idle_sessions_are_purged_after_ttl() {
    let sessions = manager();
    let start = Utc::now();
    sessions.start(1, Mode::Single, start).await;
    sessions.start(2, Mode::Single, start).await;
    sessions
        .handle_input(2, "+923001234567", start + Duration::seconds(200))
        .await;

    let purged = sessions.purge_expired(start + Duration::seconds(301)).await;
    assert_eq!(purged, 1);
    assert!(sessions.get(1).await.is_none());
    assert!(sessions.get(2).await.is_some(), "recent activity keeps session alive");
}

#[tokio::test]
async fn cancel_reports_whether_a_session_existed() {
    let sessions = manager();
    sessions.start(1, Mode::Single, Utc::now()).await;
    assert!(sessions.cancel(1).await);
    assert!(!sessions.cancel(1).await);
}

#[test]
fn transition_graph_is_mode_specific() {
    assert_eq!(Mode::Single.next_step(Step::AwaitingAddress), Some(Step::AwaitingMessage));
    assert_eq!(Mode::Single.next_step(Step::ConfirmSend), None);
    assert_eq!(Mode::Bulk.next_step(Step::AwaitingAddress), None);
    assert_eq!(
        Mode::Scheduled.next_step(Step::AwaitingScheduleMessage),
        Some(Step::ConfirmSend)
    );
}
