//! Bounded worker pool (C11): `max_workers` consumers draining a
//! bounded FIFO, with a priority heap absorbing submissions that would
//! overflow the FIFO.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::heap::PriorityQueue;
use crate::stats::PoolStats;
use crate::task::{Task, TaskOutcome};

const SCHEDULER_TICK: Duration = Duration::from_millis(100);

struct Shared {
    stats: Mutex<PoolStats>,
    heap: Mutex<PriorityQueue>,
}

/// A bounded pool of workers draining a bounded FIFO channel of
/// `queue_size`, with low-priority overflow absorbed by a min-heap.
pub struct WorkerPool {
    max_workers: AtomicUsize,
    queue_size: usize,
    worker_timeout: Duration,
    tx: mpsc::Sender<Task>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, queue_size: usize, worker_timeout: Duration) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_size);
        let pool = Arc::new(Self {
            max_workers: AtomicUsize::new(max_workers),
            queue_size,
            worker_timeout,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            shared: Arc::new(Shared {
                stats: Mutex::new(PoolStats::default()),
                heap: Mutex::new(PriorityQueue::new()),
            }),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
        });
        pool.clone().spawn_workers(max_workers);
        pool.clone().spawn_scheduler();
        pool
    }

    fn spawn_workers(self: Arc<Self>, n: usize) {
        let mut workers = self.workers.lock();
        for i in 0..n {
            workers.push(self.clone().spawn_one_worker(i));
        }
        self.shared.stats.lock().active_workers = workers.len();
    }

    fn spawn_one_worker(self: Arc<Self>, id: usize) -> JoinHandle<()> {
        let rx = self.rx.clone();
        let cancel = self.cancel.clone();
        let shared = self.shared.clone();
        let worker_timeout = self.worker_timeout;
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => None,
                        task = guard.recv() => task,
                    }
                };
                let Some(task) = next else {
                    break;
                };
                Self::run_task(id, task, worker_timeout, &shared).await;
            }
        })
    }

    async fn run_task(worker_id: usize, task: Task, timeout: Duration, shared: &Arc<Shared>) {
        let name = task.name.clone();
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, AssertUnwindSafe(task.work).catch_unwind()).await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                warn!(worker_id, task = %name, ?panic, "task panicked, recovered");
                TaskOutcome::Failed
            }
            Err(_) => {
                warn!(worker_id, task = %name, "task exceeded worker timeout");
                TaskOutcome::Failed
            }
        };

        let succeeded = matches!(outcome, TaskOutcome::Succeeded);
        shared
            .stats
            .lock()
            .record_finished(succeeded, started.elapsed());
        info!(worker_id, task = %name, succeeded, "task finished");
    }

    fn spawn_scheduler(self: Arc<Self>) {
        let pool = self.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCHEDULER_TICK);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => pool.drain_heap_into_fifo(),
                }
            }
        });
        *self.scheduler.lock() = Some(handle);
    }

    fn drain_heap_into_fifo(&self) {
        loop {
            if self.tx.capacity() == 0 {
                break;
            }
            let task = {
                let mut heap = self.shared.heap.lock();
                heap.pop()
            };
            let Some(task) = task else { break };
            if self.tx.try_send(task).is_err() {
                break;
            }
        }
    }

    /// Non-blocking enqueue. Falls back to the priority heap on FIFO
    /// overflow.
    pub fn submit(&self, task: Task, priority: i32) {
        self.shared.stats.lock().record_submitted();
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.shared.heap.lock().push(priority, task);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("submit after pool stopped");
            }
        }
    }

    /// Remove a still-queued (not yet dispatched) task from the
    /// priority heap by name.
    pub fn cancel_queued(&self, name: &str) -> bool {
        let removed = self.shared.heap.lock().remove_by_name(name);
        if removed {
            self.shared.stats.lock().record_cancelled();
        }
        removed
    }

    pub fn stats(&self) -> PoolStats {
        let stats = self.shared.stats.lock();
        let mut snapshot = stats.clone();
        snapshot.queued = self.queue_size.saturating_sub(self.tx.capacity());
        snapshot.priority_queued = self.shared.heap.lock().len();
        snapshot
    }

    /// Grows or shrinks the live worker set.
    pub fn resize(self: &Arc<Self>, n: usize) {
        self.max_workers.store(n, Ordering::SeqCst);
        let mut workers = self.workers.lock();
        if n > workers.len() {
            let start = workers.len();
            for i in start..n {
                workers.push(self.clone().spawn_one_worker(i));
            }
        } else {
            while workers.len() > n {
                if let Some(handle) = workers.pop() {
                    handle.abort();
                }
            }
        }
        self.shared.stats.lock().active_workers = workers.len();
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers.load(Ordering::SeqCst)
    }

    /// Tears all workers down; the pool cannot be reused afterward.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn outcome_task(name: &str, outcome: TaskOutcome) -> Task {
        Task::new(name, Box::pin(async move { outcome }))
    }

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let pool = WorkerPool::new(2, 4, Duration::from_secs(5));
        let counter = Arc::new(AtomicU32::new(0));
        for i in 0..4 {
            let counter = counter.clone();
            pool.submit(
                Task::new(
                    format!("t{i}"),
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        TaskOutcome::Succeeded
                    }),
                ),
                0,
            );
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        pool.stop().await;
    }

    #[tokio::test]
    async fn overflow_goes_to_priority_heap_then_drains() {
        let pool = WorkerPool::new(1, 1, Duration::from_secs(5));
        // Fill the single worker with a slow task, then overflow the
        // size-1 FIFO with two more submissions.
        pool.submit(
            Task::new(
                "slow",
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    TaskOutcome::Succeeded
                }),
            ),
            0,
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.submit(outcome_task("fifo-filler", TaskOutcome::Succeeded), 5);
        pool.submit(outcome_task("overflow", TaskOutcome::Succeeded), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let stats = pool.stats();
        assert_eq!(stats.completed, 3);
        pool.stop().await;
    }

    #[tokio::test]
    async fn panic_is_recovered_as_failure() {
        let pool = WorkerPool::new(1, 2, Duration::from_secs(5));
        pool.submit(
            Task::new(
                "boom",
                Box::pin(async {
                    panic!("deliberate");
                    #[allow(unreachable_code)]
                    TaskOutcome::Succeeded
                }),
            ),
            0,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.stats().failed, 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn resize_changes_active_worker_count() {
        let pool = WorkerPool::new(1, 4, Duration::from_secs(5));
        pool.resize(3);
        assert_eq!(pool.max_workers(), 3);
        assert_eq!(pool.stats().active_workers, 3);
        pool.stop().await;
    }
}
