//! End-to-end behaviour of ingest, evaluation and latched delivery.

use std::sync::Arc;
use std::time::Duration;

use diagwatch_core::transport::{FanoutTransport, FileTransport, LatchedTopic};
use diagwatch_core::{
    change, Aggregator, AggregatorConfig, CycleOutcome, Level, RawStatus, ReportBatch, Snapshot,
};
use tokio::time::Instant;

fn latched(config: AggregatorConfig) -> (Aggregator, LatchedTopic) {
    Aggregator::builder().config(config).build_latched("diagnostics_agg").unwrap()
}

#[test]
fn primary_report_lifecycle() {
    let (mut aggregator, topic) = latched(AggregatorConfig::default());
    let handle = aggregator.ingest_handle();
    let t0 = Instant::now();

    handle.ingest("/root", RawStatus::new("primary", Level::Ok)).unwrap();
    assert!(aggregator.evaluate_at(t0).is_published());
    let first = topic.latest().unwrap();
    assert_eq!(first.node("/root").map(|n| n.level), Some(Level::Ok));

    // Nothing new: no publish, and a fresh subscriber still sees the summary.
    assert!(aggregator.evaluate_at(t0 + Duration::from_secs(1)).is_unchanged());
    let mut fresh = topic.subscribe();
    assert_eq!(fresh.latest(), Some(first.clone()));

    // Identical content resent: still no publish.
    handle.ingest("/root", RawStatus::new("primary", Level::Ok)).unwrap();
    assert!(aggregator.evaluate_at(t0 + Duration::from_secs(2)).is_unchanged());

    handle.ingest("/root", RawStatus::new("primary", Level::Error)).unwrap();
    assert!(aggregator.evaluate_at(t0 + Duration::from_secs(3)).is_published());
    let latest = topic.latest().unwrap();
    assert_eq!(latest.node("/root").map(|n| n.level), Some(Level::Error));
    assert_eq!(latest.level(), Level::Error);

    assert_eq!(topic.retained().len(), 2);
    assert_eq!(aggregator.publish_stats().published, 2);
}

#[test]
fn late_subscriber_matches_early_subscriber() {
    let (mut aggregator, topic) = latched(AggregatorConfig::default());
    let handle = aggregator.ingest_handle();
    let mut early = topic.subscribe();
    let t0 = Instant::now();

    handle.ingest_batch(
        ReportBatch::new("/robot/drive")
            .status(RawStatus::new("left", Level::Ok))
            .status(RawStatus::new("right", Level::Warn).message("running hot")),
    );
    aggregator.evaluate_at(t0);
    for i in 1..=10 {
        assert!(aggregator.evaluate_at(t0 + Duration::from_millis(100 * i)).is_unchanged());
    }

    let mut late = topic.subscribe();
    let seen_early = early.latest().unwrap();
    let seen_late = late.latest().unwrap();
    assert!(Arc::ptr_eq(&seen_early, &seen_late));
    assert_eq!(seen_late.level(), Level::Warn);
}

#[test]
fn timestamps_alone_never_trigger_a_publish() {
    let (mut aggregator, topic) = latched(AggregatorConfig::default());
    let handle = aggregator.ingest_handle();
    let t0 = Instant::now();

    handle
        .ingest("/root", RawStatus::new("primary", Level::Ok).timestamp_ms(1_000))
        .unwrap();
    aggregator.evaluate_at(t0);

    for ts in [2_000, 3_000, 4_000] {
        handle
            .ingest_batch(
                ReportBatch::new("/root")
                    .timestamp_ms(ts + 1)
                    .status(RawStatus::new("primary", Level::Ok).timestamp_ms(ts)),
            );
        assert!(aggregator.evaluate_at(t0 + Duration::from_millis(ts - 1_000)).is_unchanged());
    }
    assert_eq!(topic.retained().len(), 1);
}

#[test]
fn error_leaf_rolls_up_to_every_ancestor() {
    let (mut aggregator, topic) = latched(AggregatorConfig::default());
    let handle = aggregator.ingest_handle();

    handle.ingest("/robot/arm", RawStatus::new("gripper", Level::Ok)).unwrap();
    handle.ingest("/robot/arm/wrist", RawStatus::new("encoder", Level::Error)).unwrap();
    handle.ingest("/robot/base", RawStatus::new("lidar", Level::Warn)).unwrap();
    aggregator.evaluate();

    let snapshot = topic.latest().unwrap();
    for path in ["/", "/robot", "/robot/arm", "/robot/arm/wrist"] {
        assert_eq!(snapshot.node(path).map(|n| n.level), Some(Level::Error), "{}", path);
    }
    assert_eq!(snapshot.node("/robot/base").map(|n| n.level), Some(Level::Warn));

    let paths: Vec<&str> = snapshot.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(
        paths,
        ["/", "/robot", "/robot/arm", "/robot/arm/wrist", "/robot/base"]
    );
}

#[test]
fn silent_source_goes_stale_and_that_is_published() {
    let config = AggregatorConfig::default().with_staleness_timeout(Duration::from_secs(2));
    let (mut aggregator, topic) = latched(config);
    let handle = aggregator.ingest_handle();
    let t0 = Instant::now();

    handle.ingest("/sensors", RawStatus::new("imu", Level::Ok)).unwrap();
    handle.ingest("/sensors", RawStatus::new("gps", Level::Ok)).unwrap();
    aggregator.evaluate_at(t0);

    assert!(aggregator.evaluate_at(t0 + Duration::from_secs(1)).is_unchanged());
    let outcome = aggregator.evaluate_at(t0 + Duration::from_secs(3));
    assert!(outcome.is_published());

    let snapshot = topic.latest().unwrap();
    let node = snapshot.node("/sensors").unwrap();
    assert_eq!(node.level, Level::Stale);
    assert_eq!(node.report("imu").map(|r| r.level), Some(Level::Stale));
}

#[test]
fn failed_publish_is_retried_on_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").join("agg.json");
    let topic = LatchedTopic::new("agg", 10);
    let mut aggregator = Aggregator::builder()
        .transport(
            FanoutTransport::new()
                .with(topic.clone())
                .with(FileTransport::new(&target)),
        )
        .build()
        .unwrap();

    assert!(matches!(aggregator.evaluate(), CycleOutcome::Failed(_)));
    assert!(aggregator.published().last_snapshot().is_none());

    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    assert!(aggregator.evaluate().is_published());

    let written: Snapshot = serde_json::from_slice(&std::fs::read(&target).unwrap()).unwrap();
    let published = aggregator.published().last_snapshot().unwrap();
    assert!(!change::differs(&written, Some(published)));
}

#[test]
fn broken_file_sink_does_not_repeat_snapshots_to_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").join("agg.json");
    let topic = LatchedTopic::new("agg", 10);
    let mut aggregator = Aggregator::builder()
        .transport(
            FanoutTransport::new()
                .with(topic.clone())
                .with(FileTransport::new(&target)),
        )
        .build()
        .unwrap();
    let handle = aggregator.ingest_handle();
    let mut live = topic.subscribe();

    handle.ingest("/root", RawStatus::new("primary", Level::Warn)).unwrap();
    let t0 = Instant::now();
    for i in 0..5 {
        let outcome = aggregator.evaluate_at(t0 + Duration::from_millis(100 * i));
        assert!(matches!(outcome, CycleOutcome::Failed(_)));
    }

    let mut received = 0;
    while live.try_recv().is_some() {
        received += 1;
    }
    assert_eq!(received, 1);
    assert_eq!(topic.retained().len(), 1);
    assert_eq!(aggregator.publish_stats().failed, 5);

    // Once the sink is writable the retry reaches only the file.
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    assert!(aggregator.evaluate_at(t0 + Duration::from_secs(1)).is_published());
    assert!(target.exists());
    assert!(live.try_recv().is_none());
}

#[test]
fn excluded_namespaces_never_appear() {
    let config = AggregatorConfig::default().with_exclusion("/simulation");
    let (mut aggregator, topic) = latched(config);
    let handle = aggregator.ingest_handle();

    let summary = handle.ingest_batch(
        ReportBatch::new("/simulation/world").status(RawStatus::new("physics", Level::Error)),
    );
    assert_eq!(summary.excluded, 1);
    aggregator.evaluate();

    let snapshot = topic.latest().unwrap();
    assert_eq!(snapshot.level(), Level::Ok);
    assert!(snapshot.node("/simulation/world").is_none());
}

#[tokio::test(start_paused = true)]
async fn producers_on_many_tasks_feed_one_driver() {
    let config = AggregatorConfig::default()
        .with_evaluation_period(Duration::from_millis(500))
        .with_staleness_timeout(Duration::from_secs(60));
    let (aggregator, topic) = latched(config);
    let handle = aggregator.ingest_handle();
    let driver = aggregator.start();

    let mut producers = Vec::new();
    for p in 0..8 {
        let handle = handle.clone();
        producers.push(tokio::spawn(async move {
            for r in 0..5 {
                handle
                    .ingest(
                        &format!("/fleet/robot-{}", p),
                        RawStatus::new(format!("check-{}", r), Level::Ok),
                    )
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    let aggregator = driver.stop().await.unwrap();

    let snapshot = topic.latest().unwrap();
    assert_eq!(snapshot.report_count(), 40);
    assert_eq!(aggregator.ingest_stats().accepted, 40);
    assert_eq!(snapshot.len(), 10);
}
