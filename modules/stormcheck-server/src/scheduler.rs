//! Recurring operation scheduler.
//!
//! Each operation kind owns an interval and a run lock. A background tick
//! loop fires kinds that are due; manual triggers go through the same lock,
//! so at most one run per kind is in flight. A trigger that finds the lock
//! held is skipped, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use stormcheck_common::{OperationKind, TriggerSource};
use stormcheck_store::Store;

const TICK: Duration = Duration::from_secs(5);

/// Record counts an operation reports back for the operation log.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpCounts {
    pub processed: i32,
    pub new: i32,
}

/// The work behind each operation kind. The scheduler owns locking and
/// logging; the runner owns the domain logic.
#[async_trait]
pub trait OperationRunner: Send + Sync {
    async fn run(&self, kind: OperationKind) -> Result<OpCounts>;
}

/// Per-kind polling cadence.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub alert_poll: Duration,
    pub report_poll: Duration,
    pub verification: Duration,
}

/// Point-in-time view of one operation kind, as served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub kind: OperationKind,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success: Option<bool>,
    pub running: bool,
    pub next_due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct KindState {
    last_run_at: Option<DateTime<Utc>>,
    last_success: Option<bool>,
}

struct KindSlot {
    interval: Duration,
    lock: Arc<Mutex<()>>,
    state: RwLock<KindState>,
}

impl KindSlot {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            lock: Arc::new(Mutex::new(())),
            state: RwLock::new(KindState::default()),
        }
    }
}

struct SchedulerInner {
    store: Store,
    runner: Arc<dyn OperationRunner>,
    alert_poll: KindSlot,
    report_poll: KindSlot,
    verification: KindSlot,
    stopped: AtomicBool,
}

impl SchedulerInner {
    fn slot(&self, kind: OperationKind) -> &KindSlot {
        match kind {
            OperationKind::AlertPoll => &self.alert_poll,
            OperationKind::ReportPoll => &self.report_poll,
            OperationKind::Verification => &self.verification,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(store: Store, runner: Arc<dyn OperationRunner>, intervals: Intervals) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                runner,
                alert_poll: KindSlot::new(intervals.alert_poll),
                report_poll: KindSlot::new(intervals.report_poll),
                verification: KindSlot::new(intervals.verification),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the tick loop. Runs until `stop` is called.
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            info!("Scheduler started");
            loop {
                if scheduler.inner.stopped.load(Ordering::Relaxed) {
                    break;
                }
                let now = Utc::now();
                for kind in OperationKind::ALL {
                    if scheduler.due(kind, now).await {
                        scheduler.trigger(kind, TriggerSource::Scheduler);
                    }
                }
                tokio::time::sleep(TICK).await;
            }
            info!("Scheduler stopped");
        })
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Relaxed);
    }

    /// Fires one kind outside its schedule. Returns false when a run of
    /// that kind is already in flight.
    pub fn run_now(&self, kind: OperationKind) -> bool {
        self.trigger(kind, TriggerSource::Manual)
    }

    /// Resolves once no operation is in flight, or gives up at the
    /// deadline.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let all_idle = async {
            for kind in OperationKind::ALL {
                let _guard = self.inner.slot(kind).lock.lock().await;
            }
        };
        tokio::time::timeout(timeout, all_idle).await.is_ok()
    }

    pub async fn status(&self) -> Vec<OperationStatus> {
        let mut statuses = Vec::with_capacity(OperationKind::ALL.len());
        for kind in OperationKind::ALL {
            let slot = self.inner.slot(kind);
            let state = slot.state.read().await;
            statuses.push(OperationStatus {
                kind,
                last_run_at: state.last_run_at,
                last_success: state.last_success,
                running: slot.lock.try_lock().is_err(),
                next_due_at: state.last_run_at.map(|last| last + slot.interval),
            });
        }
        statuses
    }

    async fn due(&self, kind: OperationKind, now: DateTime<Utc>) -> bool {
        let slot = self.inner.slot(kind);
        let state = slot.state.read().await;
        match state.last_run_at {
            None => true,
            Some(last) => now >= last + slot.interval,
        }
    }

    fn trigger(&self, kind: OperationKind, trigger: TriggerSource) -> bool {
        let slot = self.inner.slot(kind);
        let guard = match slot.lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let scheduler = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            scheduler.execute(kind, trigger).await;
        });
        true
    }

    /// Runs one operation under the caller-held lock and records it in the
    /// operation log.
    async fn execute(&self, kind: OperationKind, trigger: TriggerSource) {
        let inner = &self.inner;
        let slot = inner.slot(kind);
        slot.state.write().await.last_run_at = Some(Utc::now());

        let op_id = match inner.store.start_operation(kind, trigger).await {
            Ok(id) => id,
            Err(error) => {
                warn!(%kind, error = %error, "Failed to record operation start");
                slot.state.write().await.last_success = Some(false);
                return;
            }
        };

        info!(%kind, trigger = trigger.as_str(), "Operation started");

        let result = inner.runner.run(kind).await;
        let (success, counts, error_text) = match &result {
            Ok(counts) => (true, Some(*counts), None),
            Err(error) => (false, None, Some(format!("{error:#}"))),
        };

        if let Err(error) = inner
            .store
            .finish_operation(
                op_id,
                success,
                counts.map(|c| c.processed),
                counts.map(|c| c.new),
                error_text.as_deref(),
            )
            .await
        {
            warn!(%kind, error = %error, "Failed to record operation finish");
        }

        match &result {
            Ok(counts) => {
                info!(%kind, processed = counts.processed, new = counts.new, "Operation finished");
            }
            Err(error) => {
                warn!(%kind, error = %error, "Operation failed");
            }
        }

        slot.state.write().await.last_success = Some(success);
    }
}
