//! Tests for `health.json` writing.

use chrono::Utc;
use courier::maintenance::health::{read_health_file, write_health_file, HealthSample};

fn sample(status: &str) -> HealthSample {
    HealthSample {
        timestamp: Utc::now(),
        uptime_secs: 42,
        status: status.to_owned(),
        active_sessions: 2,
        queue_depth: 5,
        total: 10,
        successful: 9,
        failed: 1,
        success_rate: Some(90.0),
    }
}

#[tokio::test]
async fn write_then_read_health_file() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("nested").join("health.json");

    write_health_file(&sample("running"), &path)
        .await
        .expect("write should succeed");

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists(), "temp file renamed away");
    let read = read_health_file(&path).await.expect("read should succeed");
    assert_eq!(read.uptime_secs, 42);
    assert!(read.is_healthy());
}

#[tokio::test]
async fn missing_health_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    assert!(read_health_file(&tmp.path().join("health.json")).await.is_err());
}

#[test]
fn degraded_sample_is_not_healthy() {
    assert!(!sample("degraded").is_healthy());
}
