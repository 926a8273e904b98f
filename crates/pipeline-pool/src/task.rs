//! The unit of work the pool executes.

use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

pub type TaskFuture = Pin<Box<dyn Future<Output = TaskOutcome> + Send>>;

/// A named unit of work submitted to the pool. `name` is used for
/// diagnostics and for removing a still-queued task from the priority
/// heap.
pub struct Task {
    pub name: String,
    pub work: TaskFuture,
}

impl Task {
    pub fn new(name: impl Into<String>, work: TaskFuture) -> Self {
        Self {
            name: name.into(),
            work,
        }
    }
}
