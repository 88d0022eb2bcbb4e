//! Dispatch queue batching and re-entrancy tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use courier::dispatch::queue::{DispatchQueue, DrainOutcome, RetryPolicy};
use courier::dispatch::{DispatchError, TransmissionRequest, TransmissionResult, TransmissionStatus};

fn request(n: usize) -> TransmissionRequest {
    TransmissionRequest::new(1, format!("+9230012345{n:02}"), format!("message {n}"))
}

fn delivered(request: &TransmissionRequest) -> TransmissionResult {
    let mut result = TransmissionResult::failure(request, "DIRECT_CARRIER", "");
    result.success = true;
    result.status = TransmissionStatus::Delivered;
    result.error = None;
    result.timestamp = Utc::now();
    result
}

#[tokio::test]
async fn drain_takes_at_most_one_batch() {
    let queue = DispatchQueue::new(10);
    queue.enqueue_all((0..25).map(request)).await;

    let outcome = queue
        .drain_tick(|r| async move { Ok(delivered(&r)) })
        .await;

    assert_eq!(
        outcome,
        DrainOutcome::Processed {
            taken: 10,
            delivered: 10,
            failed: 0,
            errored: 0
        }
    );
    assert_eq!(queue.len().await, 15);
}

#[tokio::test]
async fn backlog_drains_in_ceil_n_over_ten_ticks() {
    let queue = DispatchQueue::new(10);
    queue.enqueue_all((0..23).map(request)).await;

    let mut ticks = 0;
    while !queue.is_empty().await {
        queue.drain_tick(|r| async move { Ok(delivered(&r)) }).await;
        ticks += 1;
    }
    assert_eq!(ticks, 3);
}

#[tokio::test]
async fn drain_preserves_fifo_order() {
    let queue = DispatchQueue::new(10);
    let requests: Vec<_> = (0..5).map(request).collect();
    let expected: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    queue.enqueue_all(requests).await;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    queue
        .drain_tick(move |r| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().expect("lock").push(r.id.clone());
                Ok(delivered(&r))
            }
        })
        .await;

    assert_eq!(*seen.lock().expect("lock"), expected);
}

#[tokio::test]
async fn one_failure_does_not_abort_the_batch() {
    let queue = DispatchQueue::new(10);
    queue.enqueue_all((0..4).map(request)).await;
    let calls = AtomicUsize::new(0);

    let outcome = queue
        .drain_tick(|r| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    1 => Err(DispatchError::System("boom".to_owned())),
                    2 => Ok(TransmissionResult::failure(&r, "MESH_NETWORK", "rejected")),
                    _ => Ok(delivered(&r)),
                }
            }
        })
        .await;

    assert_eq!(
        outcome,
        DrainOutcome::Processed {
            taken: 4,
            delivered: 2,
            failed: 1,
            errored: 1
        }
    );
    assert!(queue.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_skipped() {
    let queue = Arc::new(DispatchQueue::new(10));
    queue.enqueue_all((0..3).map(request)).await;

    let slow = Arc::clone(&queue);
    let first = tokio::spawn(async move {
        slow.drain_tick(|r| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(delivered(&r))
        })
        .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.is_draining());
    let second = queue.drain_tick(|r| async move { Ok(delivered(&r)) }).await;
    assert_eq!(second, DrainOutcome::Skipped);

    let first = first.await.expect("task should finish");
    assert!(matches!(first, DrainOutcome::Processed { taken: 3, .. }));
    assert!(!queue.is_draining());
}

#[tokio::test]
async fn empty_queue_processes_nothing() {
    let queue = DispatchQueue::default();
    assert_eq!(queue.batch_size(), 10);
    let outcome = queue.drain_tick(|r| async move { Ok(delivered(&r)) }).await;
    assert_eq!(
        outcome,
        DrainOutcome::Processed {
            taken: 0,
            delivered: 0,
            failed: 0,
            errored: 0
        }
    );
}

#[test]
fn retry_policy_allows_exactly_one_retry() {
    let policy = RetryPolicy::once_after(Duration::from_secs(5));
    assert!(policy.allows(0));
    assert!(!policy.allows(1));
    assert_eq!(RetryPolicy::default().delay, Duration::from_secs(5));
}
