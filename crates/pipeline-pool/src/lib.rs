//! Bounded worker pool with priority overflow queue (C11).

pub mod heap;
pub mod pool;
pub mod stats;
pub mod task;

pub use heap::PriorityQueue;
pub use pool::WorkerPool;
pub use stats::PoolStats;
pub use task::{Task, TaskFuture, TaskOutcome};
