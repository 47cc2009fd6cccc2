//! Integration tests for the operation scheduler.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use stormcheck_common::{OperationKind, TriggerSource};
use stormcheck_server::scheduler::{Intervals, OpCounts, OperationRunner, Scheduler};
use stormcheck_store::Store;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn test_store() -> Option<Store> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = Store::connect(&url).await.ok()?;
    Some(store)
}

/// Counts invocations and holds the run lock long enough for a second
/// trigger to collide with the first.
struct SlowRunner {
    runs: Arc<AtomicU32>,
    hold: Duration,
}

#[async_trait]
impl OperationRunner for SlowRunner {
    async fn run(&self, _kind: OperationKind) -> Result<OpCounts> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.hold).await;
        Ok(OpCounts {
            processed: 7,
            new: 3,
        })
    }
}

struct FailingRunner;

#[async_trait]
impl OperationRunner for FailingRunner {
    async fn run(&self, _kind: OperationKind) -> Result<OpCounts> {
        anyhow::bail!("upstream feed unreachable")
    }
}

/// Long intervals so the tick loop never fires on its own during a test.
fn parked_intervals() -> Intervals {
    Intervals {
        alert_poll: Duration::from_secs(3600),
        report_poll: Duration::from_secs(3600),
        verification: Duration::from_secs(3600),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_triggers_of_one_kind_collapse_to_one_run() {
    let Some(store) = test_store().await else {
        return;
    };

    let runs = Arc::new(AtomicU32::new(0));
    let runner = SlowRunner {
        runs: runs.clone(),
        hold: Duration::from_millis(300),
    };
    let scheduler = Scheduler::new(store, Arc::new(runner), parked_intervals());

    // The lock is taken before the run is spawned, so a second trigger
    // collides immediately.
    assert!(scheduler.run_now(OperationKind::AlertPoll));
    assert!(
        !scheduler.run_now(OperationKind::AlertPoll),
        "second trigger must be skipped while the first holds the lock"
    );

    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // Once idle the kind accepts a fresh trigger.
    assert!(scheduler.run_now(OperationKind::AlertPoll));
    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(runs.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn kinds_run_independently_of_each_other() {
    let Some(store) = test_store().await else {
        return;
    };

    let runs = Arc::new(AtomicU32::new(0));
    let runner = SlowRunner {
        runs: runs.clone(),
        hold: Duration::from_millis(200),
    };
    let scheduler = Scheduler::new(store, Arc::new(runner), parked_intervals());

    assert!(scheduler.run_now(OperationKind::AlertPoll));
    // A different kind is not blocked by the alert poll's lock.
    assert!(scheduler.run_now(OperationKind::ReportPoll));

    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(runs.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn successful_run_is_logged_with_counts() {
    let Some(store) = test_store().await else {
        return;
    };

    let runs = Arc::new(AtomicU32::new(0));
    let runner = SlowRunner {
        runs,
        hold: Duration::from_millis(10),
    };
    let scheduler = Scheduler::new(store.clone(), Arc::new(runner), parked_intervals());

    assert!(scheduler.run_now(OperationKind::Verification));
    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

    let entries = store
        .recent_operations(Some(OperationKind::Verification), 5)
        .await
        .unwrap();
    let entry = entries
        .iter()
        .find(|e| e.trigger == TriggerSource::Manual && e.success == Some(true))
        .expect("finished manual run should be logged");
    assert_eq!(entry.records_processed, Some(7));
    assert_eq!(entry.records_new, Some(3));
    assert!(entry.finished_at.is_some());
    assert!(entry.error.is_none());
}

#[tokio::test]
async fn failed_run_is_logged_with_the_error() {
    let Some(store) = test_store().await else {
        return;
    };

    let scheduler = Scheduler::new(store.clone(), Arc::new(FailingRunner), parked_intervals());

    assert!(scheduler.run_now(OperationKind::ReportPoll));
    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

    let entries = store
        .recent_operations(Some(OperationKind::ReportPoll), 10)
        .await
        .unwrap();
    let entry = entries
        .iter()
        .find(|e| e.success == Some(false))
        .expect("failed run should be logged");
    assert!(
        entry
            .error
            .as_deref()
            .is_some_and(|e| e.contains("upstream feed unreachable")),
        "error text should carry the runner's failure"
    );
    assert_eq!(entry.records_processed, None);
    assert_eq!(entry.records_new, None);
}

#[tokio::test]
async fn status_projects_next_due_from_last_run() {
    let Some(store) = test_store().await else {
        return;
    };

    let runs = Arc::new(AtomicU32::new(0));
    let runner = SlowRunner {
        runs,
        hold: Duration::from_millis(10),
    };
    let scheduler = Scheduler::new(store, Arc::new(runner), parked_intervals());

    let before: Vec<_> = scheduler.status().await;
    assert_eq!(before.len(), 3);
    for status in &before {
        assert!(status.last_run_at.is_none());
        assert!(status.last_success.is_none());
        assert!(status.next_due_at.is_none());
        assert!(!status.running);
    }

    assert!(scheduler.run_now(OperationKind::AlertPoll));
    assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

    let after = scheduler.status().await;
    let alert_poll = after
        .iter()
        .find(|s| s.kind == OperationKind::AlertPoll)
        .expect("alert poll status");
    let last = alert_poll.last_run_at.expect("last run recorded");
    assert_eq!(alert_poll.last_success, Some(true));
    assert_eq!(
        alert_poll.next_due_at,
        Some(last + Duration::from_secs(3600))
    );
    assert!(!alert_poll.running);

    let untouched = after
        .iter()
        .find(|s| s.kind == OperationKind::ReportPoll)
        .expect("report poll status");
    assert!(untouched.last_run_at.is_none());
}
