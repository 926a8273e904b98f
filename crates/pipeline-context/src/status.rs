//! Pipeline-status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Paused,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStatus::Success | PipelineStatus::Failed | PipelineStatus::Canceled
        )
    }

    fn allowed_next(self) -> &'static [PipelineStatus] {
        use PipelineStatus::*;
        match self {
            Pending => &[Running, Canceled],
            Running => &[Success, Failed, Canceled, Paused],
            Failed => &[Running],
            Paused => &[Running, Canceled],
            Success | Canceled => &[],
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
}

/// One attempted transition, successful or not, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineStatus,
    pub to: PipelineStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
}

/// The pipeline-status state machine plus its transition history.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    status: PipelineStatus,
    end_time: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self {
            status: PipelineStatus::Pending,
            end_time: None,
            history: Vec::new(),
        }
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Validated transition per the §4.6 matrix.
    pub fn transition(&mut self, to: PipelineStatus) -> Result<(), InvalidTransition> {
        let from = self.status;
        if !from.allowed_next().contains(&to) {
            let err = InvalidTransition { from, to };
            self.history.push(TransitionRecord {
                from,
                to,
                at: Utc::now(),
                error: Some(err.to_string()),
            });
            return Err(err);
        }
        self.apply(from, to);
        Ok(())
    }

    /// Initialization/recovery path: sets status without matrix
    /// validation. Never use this for a live run's normal transitions.
    pub fn set_status(&mut self, to: PipelineStatus) {
        let from = self.status;
        self.apply(from, to);
    }

    /// Unconditional transition to `canceled`, bypassing the matrix.
    pub fn abort(&mut self) {
        let from = self.status;
        self.apply(from, PipelineStatus::Canceled);
    }

    fn apply(&mut self, from: PipelineStatus, to: PipelineStatus) {
        self.status = to;
        if to.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        self.history.push(TransitionRecord {
            from,
            to,
            at: Utc::now(),
            error: None,
        });
    }

    /// Clears status back to pending and end_time, keeping history (a
    /// fresh run has its own history entries appended after this).
    pub fn reset_for_reuse(&mut self) {
        self.status = PipelineStatus::Pending;
        self.end_time = None;
    }
}
