use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, Semaphore, oneshot};
use wag_common::{GatewayError, Result};

use crate::{config::QueueConfig, job::{Job, QueueResponse}};

struct Entry {
    priority: i32,
    seq: u64,
    job: Job,
    reply: oneshot::Sender<Result<QueueResponse>>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so `BinaryHeap` (a max-heap) pops the lowest priority number
    // first, and among equal priorities, the earliest sequence number (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueTotals {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub size: usize,
    pub pending: usize,
    pub paused: bool,
    pub totals: QueueTotals,
    pub success_rate: f64,
    pub last_activity: DateTime<Utc>,
}

struct Shared {
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
    paused: AtomicBool,
    seq: AtomicU64,
    pending: AtomicUsize,
    totals: Mutex<QueueTotals>,
    last_activity: Mutex<DateTime<Utc>>,
    last_dispatch: Mutex<Option<Instant>>,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
}

/// A per-instance FIFO queue: at most `concurrency` jobs in flight, dispatch
/// starts spaced at least `interval` apart, priority breaks ties by
/// ascending priority number and then FIFO order.
pub struct InstanceQueue {
    shared: Arc<Shared>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl InstanceQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            paused: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            totals: Mutex::new(QueueTotals::default()),
            last_activity: Mutex::new(Utc::now()),
            last_dispatch: Mutex::new(None),
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            config,
        });
        let dispatcher = tokio::spawn(run_dispatcher(shared.clone()));
        Self { shared, dispatcher }
    }

    pub fn config(&self) -> QueueConfig {
        self.shared.config
    }

    /// Enqueue `job` at `priority` and await its outcome.
    pub async fn add(&self, job: Job, priority: i32) -> Result<QueueResponse> {
        let (tx, rx) = oneshot::channel();
        self.push(job, priority, tx).await;
        rx.await.unwrap_or_else(|_| Err(GatewayError::internal("queue dropped the job before it completed")))
    }

    /// Enqueue every job at `priority`; waits for all of them to settle and
    /// returns each outcome independently (a failure does not cancel the
    /// others).
    pub async fn add_bulk(&self, jobs: Vec<Job>, priority: i32) -> Vec<Result<QueueResponse>> {
        let mut receivers = Vec::with_capacity(jobs.len());
        for job in jobs {
            let (tx, rx) = oneshot::channel();
            self.push(job, priority, tx).await;
            receivers.push(rx);
        }
        let mut out = Vec::with_capacity(receivers.len());
        for rx in receivers {
            out.push(
                rx.await
                    .unwrap_or_else(|_| Err(GatewayError::internal("queue dropped the job before it completed"))),
            );
        }
        out
    }

    async fn push(&self, job: Job, priority: i32, reply: oneshot::Sender<Result<QueueResponse>>) {
        let seq = self.shared.seq.fetch_add(1, AtomicOrdering::Relaxed);
        {
            let mut heap = self.shared.heap.lock().await;
            heap.push(Entry { priority, seq, job, reply });
        }
        {
            let mut totals = self.shared.totals.lock().await;
            totals.total_jobs += 1;
        }
        *self.shared.last_activity.lock().await = Utc::now();
        self.shared.notify.notify_one();
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, AtomicOrdering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, AtomicOrdering::SeqCst);
        self.shared.notify.notify_one();
    }

    /// Drop every queued job without dispatching it, rejecting each
    /// caller's future.
    pub async fn clear(&self) {
        let mut heap = self.shared.heap.lock().await;
        heap.clear();
    }

    pub async fn status(&self) -> QueueStatus {
        let size = self.shared.heap.lock().await.len();
        let totals = self.shared.totals.lock().await.clone();
        let last_activity = *self.shared.last_activity.lock().await;
        let success_rate = if totals.completed_jobs + totals.failed_jobs == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = totals.completed_jobs as f64 / (totals.completed_jobs + totals.failed_jobs) as f64;
            rate
        };
        QueueStatus {
            size,
            pending: self.shared.pending.load(AtomicOrdering::Relaxed),
            paused: self.shared.paused.load(AtomicOrdering::SeqCst),
            totals,
            success_rate,
            last_activity,
        }
    }

    pub async fn is_idle(&self, max_idle_time: Duration) -> bool {
        let size = self.shared.heap.lock().await.len();
        let pending = self.shared.pending.load(AtomicOrdering::Relaxed);
        if size != 0 || pending != 0 {
            return false;
        }
        let last_activity = *self.shared.last_activity.lock().await;
        let idle_for = Utc::now().signed_duration_since(last_activity);
        idle_for.to_std().map(|d| d >= max_idle_time).unwrap_or(false)
    }
}

impl Drop for InstanceQueue {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn run_dispatcher(shared: Arc<Shared>) {
    loop {
        if shared.paused.load(AtomicOrdering::SeqCst) {
            shared.notify.notified().await;
            continue;
        }

        let entry = {
            let mut heap = shared.heap.lock().await;
            heap.pop()
        };
        let Some(entry) = entry else {
            shared.notify.notified().await;
            continue;
        };

        {
            let mut last = shared.last_dispatch.lock().await;
            if let Some(t) = *last {
                let elapsed = t.elapsed();
                if elapsed < shared.config.interval {
                    tokio::time::sleep(shared.config.interval - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        let Ok(permit) = shared.semaphore.clone().acquire_owned().await else {
            continue;
        };

        shared.pending.fetch_add(1, AtomicOrdering::Relaxed);
        let job = entry.job;
        let reply = entry.reply;
        let timeout = shared.config.job_timeout;
        let shared_for_task = shared.clone();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, job).await {
                Ok(Ok(resp)) => Ok(resp),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(GatewayError::Timeout),
            };

            {
                let mut totals = shared_for_task.totals.lock().await;
                if outcome.is_ok() {
                    totals.completed_jobs += 1;
                } else {
                    totals.failed_jobs += 1;
                }
            }
            *shared_for_task.last_activity.lock().await = Utc::now();

            let _ = reply.send(outcome);
            shared_for_task.pending.fetch_sub(1, AtomicOrdering::Relaxed);
            drop(permit);
        });
    }
}
