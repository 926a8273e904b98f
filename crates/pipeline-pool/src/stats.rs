//! Pool statistics, updated via one batched struct to minimize lock
//! churn under `parking_lot::Mutex`.

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active_workers: usize,
    pub queued: usize,
    pub priority_queued: usize,
    average_execution: Duration,
}

impl PoolStats {
    pub fn average_execution_time(&self) -> Duration {
        self.average_execution
    }

    pub fn record_submitted(&mut self) {
        self.submitted += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Rolls a just-finished task's duration into the running mean over
    /// `completed + failed`.
    pub fn record_finished(&mut self, succeeded: bool, duration: Duration) {
        let n_before = self.completed + self.failed;
        if succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        let n_after = n_before + 1;
        let prev_total = self.average_execution.as_secs_f64() * n_before as f64;
        self.average_execution =
            Duration::from_secs_f64((prev_total + duration.as_secs_f64()) / n_after as f64);
    }
}
