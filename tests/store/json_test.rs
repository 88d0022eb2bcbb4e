//! File-backed store tests.

use chrono::Utc;
use courier::dispatch::stats::SystemStats;
use courier::dispatch::{TransmissionRequest, TransmissionResult};
use courier::maintenance::health::HealthSample;
use courier::store::{JsonStore, LogStore, ScheduledRequest};

fn result(n: usize) -> TransmissionResult {
    let request = TransmissionRequest::new(1, "+923001234567", format!("message {n}"));
    TransmissionResult::failure(&request, "MESH_NETWORK", "rejected")
}

fn sample() -> HealthSample {
    HealthSample {
        timestamp: Utc::now(),
        uptime_secs: 10,
        status: "running".to_owned(),
        active_sessions: 0,
        queue_depth: 0,
        total: 0,
        successful: 0,
        failed: 0,
        success_rate: None,
    }
}

fn line_count(path: &std::path::Path) -> usize {
    std::fs::read_to_string(path)
        .expect("log file should exist")
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count()
}

#[tokio::test]
async fn open_creates_layout_and_seeds_templates() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = JsonStore::open(tmp.path().join("data"), 100, 100)
        .await
        .expect("open");

    assert!(store.root().join("transmissions").is_dir());
    assert!(store.root().join("templates.json").is_file());
    assert!(!store.templates().await.is_empty());
}

#[tokio::test]
async fn transmissions_survive_reopen() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let r = result(1);
    {
        let store = JsonStore::open(tmp.path(), 100, 100).await.expect("open");
        store.append_transmission(&r).await.expect("append");
        store.touch_user(3, "Bilal", Utc::now()).await.expect("touch");
    }

    let store = JsonStore::open(tmp.path(), 100, 100).await.expect("reopen");
    assert_eq!(store.transmission_count().await, 1);
    assert_eq!(store.recent_transmissions(1).await[0], r);
    assert_eq!(
        store.transmission_detail(&r.id).await.expect("read"),
        Some(r)
    );
    assert_eq!(store.users().await[0].display_name, "Bilal");
}

#[tokio::test]
async fn log_file_is_compacted_and_reads_stay_capped() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = JsonStore::open(tmp.path(), 10, 10).await.expect("open");

    for n in 0..25 {
        store.append_transmission(&result(n)).await.expect("append");
        assert!(store.transmission_count().await <= 10);
    }

    // Compaction runs every evicted entry at cap 10, so the file stays at cap.
    let path = tmp.path().join("transmissions.jsonl");
    assert_eq!(line_count(&path), 10);

    let reopened = JsonStore::open(tmp.path(), 5, 10).await.expect("reopen");
    assert_eq!(reopened.transmission_count().await, 5);
    assert_eq!(line_count(&path), 5, "over-cap file rewritten on load");
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let r = result(1);
    let good = serde_json::to_string(&r).expect("serialize");
    std::fs::write(
        tmp.path().join("transmissions.jsonl"),
        format!("{{not json\n{good}\n"),
    )
    .expect("write");

    let store = JsonStore::open(tmp.path(), 10, 10).await.expect("open");
    assert_eq!(store.transmission_count().await, 1);
}

#[tokio::test]
async fn health_log_is_bounded() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = JsonStore::open(tmp.path(), 10, 3).await.expect("open");
    for _ in 0..7 {
        store.append_health(&sample()).await.expect("append");
    }
    assert_eq!(store.health_count().await, 3);
    assert!(store.latest_health().await.is_some());
}

#[tokio::test]
async fn unsafe_detail_ids_are_not_read() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = JsonStore::open(tmp.path(), 10, 10).await.expect("open");
    let found = store
        .transmission_detail("../users")
        .await
        .expect("lookup");
    assert!(found.is_none());
}

#[tokio::test]
async fn stats_and_scheduled_persist() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let stats = SystemStats {
        total: 4,
        successful: 3,
        failed: 1,
        start_time: Utc::now(),
    };
    {
        let store = JsonStore::open(tmp.path(), 10, 10).await.expect("open");
        store.save_stats(&stats).await.expect("save");
        store
            .add_scheduled(ScheduledRequest {
                request: TransmissionRequest::new(1, "+923001234567", "later"),
                scheduled_at: Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .expect("schedule");
    }

    let store = JsonStore::open(tmp.path(), 10, 10).await.expect("reopen");
    assert_eq!(store.load_stats().await, Some(stats));
    assert_eq!(store.scheduled().await.len(), 1);
}

#[tokio::test]
async fn reload_picks_up_external_changes() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = JsonStore::open(tmp.path(), 10, 10).await.expect("open");
    let other = JsonStore::open(tmp.path(), 10, 10).await.expect("second handle");
    other.append_transmission(&result(1)).await.expect("append");

    assert_eq!(store.transmission_count().await, 0);
    store.reload().await.expect("reload");
    assert_eq!(store.transmission_count().await, 1);
}
