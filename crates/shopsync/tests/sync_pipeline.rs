//! End-to-end runs of one stream: poller -> transform -> gate -> push -> ack,
//! with the cursor persisted to a real checkpoint file.

use shopsync::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use shopsync::cursor::RecordId;
use shopsync::dispatcher::{DispatchStatsSnapshot, Dispatcher, DispatcherConfig};
use shopsync::poller::PollerConfig;
use shopsync::rate_limiter::{RateLimitConfig, RateLimitGate};
use shopsync::traits::testing::{
    MockAcknowledger, MockDestination, MockPageSource, MockRecord, MockTransform,
};
use shopsync::StreamStatus;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn config() -> DispatcherConfig {
    DispatcherConfig {
        poller: PollerConfig {
            active_interval: Duration::from_millis(1),
            empty_interval: Duration::from_secs(1),
            cursor_reset_interval: None,
        },
        prefetch: 8,
        checkpoint_interval: Duration::from_millis(100),
    }
}

async fn run_for(
    dispatcher: Arc<Dispatcher<MockPageSource, MockRecord>>,
    duration: Duration,
) -> DispatchStatsSnapshot {
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    tokio::time::sleep(duration).await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(dispatcher.status(), StreamStatus::Stopped);
    dispatcher.stats()
}

#[tokio::test(start_paused = true)]
async fn test_three_records_flow_through_gate_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last-fetched-id.txt");

    let source = Arc::new(MockPageSource::new("customers").with_page([5, 7, 9]));
    let destination = Arc::new(MockDestination::new());
    let acknowledger = Arc::new(MockAcknowledger::new());
    // 3 per 3s: spacing floor of one second
    let gate = Arc::new(RateLimitGate::new(RateLimitConfig::new(
        3,
        Duration::from_secs(3),
    )));
    let spacing = gate.config().spacing();

    let dispatcher: Arc<Dispatcher<MockPageSource, MockRecord>> = Arc::new(
        Dispatcher::new(
            source.clone(),
            Arc::new(MockTransform::new()),
            destination.clone(),
            gate.clone(),
            Arc::new(FileCheckpointStore::<RecordId>::new(&path).without_fsync()),
            config(),
        )
        .with_acknowledger(acknowledger.clone()),
    );

    let stats = run_for(dispatcher, Duration::from_secs(10)).await;

    assert_eq!(destination.pushed_ids(), vec![5, 7, 9]);
    assert_eq!(acknowledger.acknowledged_ids(), vec![5, 7, 9]);
    assert_eq!(stats.fetched, 3);
    assert_eq!(stats.pushed, 3);

    let times = destination.push_times();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= spacing);
    }

    let cursors = source.fetch_cursors();
    assert_eq!(cursors[0], RecordId(0));
    assert!(cursors[1..].iter().all(|c| *c == RecordId(9)));

    let stored = FileCheckpointStore::<RecordId>::new(&path).load().await;
    assert_eq!(stored, RecordId(9));
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "9");
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_checkpoint_starts_from_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last-fetched-id.txt");
    std::fs::write(&path, "not-a-number").unwrap();

    let source = Arc::new(MockPageSource::new("customers").with_page([3]));
    let destination = Arc::new(MockDestination::new());
    let gate = Arc::new(RateLimitGate::new(RateLimitConfig::new(
        10,
        Duration::from_secs(1),
    )));

    let dispatcher: Arc<Dispatcher<MockPageSource, MockRecord>> = Arc::new(Dispatcher::new(
        source.clone(),
        Arc::new(MockTransform::new()),
        destination.clone(),
        gate,
        Arc::new(FileCheckpointStore::<RecordId>::new(&path).without_fsync()),
        config(),
    ));

    run_for(dispatcher, Duration::from_secs(3)).await;

    assert_eq!(source.fetch_cursors()[0], RecordId(0));
    assert_eq!(destination.pushed_ids(), vec![3]);
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "3");
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_the_stream() {
    let source = Arc::new(
        MockPageSource::new("orders")
            .with_page([1, 2, 3])
            .with_failure("shop unavailable")
            .with_page([4, 5, 6]),
    );
    let transform = Arc::new(MockTransform::new().reject([2]));
    let destination = Arc::new(MockDestination::new().duplicate_on([4]).fail_on([5]));
    let acknowledger = Arc::new(MockAcknowledger::new());
    let checkpoint = Arc::new(MemoryCheckpointStore::<RecordId>::new());
    let gate = Arc::new(RateLimitGate::new(RateLimitConfig::new(
        100,
        Duration::from_secs(1),
    )));

    let dispatcher: Arc<Dispatcher<MockPageSource, MockRecord>> = Arc::new(
        Dispatcher::new(
            source.clone(),
            transform.clone(),
            destination.clone(),
            gate,
            checkpoint.clone(),
            config(),
        )
        .with_acknowledger(acknowledger.clone()),
    );

    let stats = run_for(dispatcher, Duration::from_secs(5)).await;

    assert_eq!(transform.seen_ids(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(destination.pushed_ids(), vec![1, 3, 4, 5, 6]);
    // duplicate 4 is acknowledged, failed push 5 is not
    assert_eq!(acknowledger.acknowledged_ids(), vec![1, 3, 4, 6]);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.push_failed, 1);
    assert_eq!(stats.delivered(), 4);
    assert_eq!(checkpoint.get(), Some(RecordId(6)));
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_after_persisted_cursor() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("last-fetched-id.txt");
    FileCheckpointStore::<RecordId>::new(&path)
        .save(&RecordId(41))
        .await
        .unwrap();

    let source = Arc::new(MockPageSource::new("customers").with_page([42]));
    let destination = Arc::new(MockDestination::new());
    let gate = Arc::new(RateLimitGate::new(RateLimitConfig::new(
        10,
        Duration::from_secs(1),
    )));

    let dispatcher: Arc<Dispatcher<MockPageSource, MockRecord>> = Arc::new(Dispatcher::new(
        source.clone(),
        Arc::new(MockTransform::new()),
        destination.clone(),
        gate,
        Arc::new(FileCheckpointStore::<RecordId>::new(&path).without_fsync()),
        config(),
    ));

    run_for(dispatcher, Duration::from_secs(2)).await;

    assert_eq!(source.fetch_cursors()[0], RecordId(41));
    assert_eq!(destination.pushed_ids(), vec![42]);
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "42");
}
