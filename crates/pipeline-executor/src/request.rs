//! The request/outcome types passed across the executor boundary.

use std::collections::HashMap;

use pipeline_core::spec::{Job, Pipeline, Step};

/// Everything an executor needs to run one step, assembled by the step
/// runner (C8) with the pipeline < job < step environment already
/// merged.
pub struct ExecutionRequest<'a> {
    pub pipeline: &'a Pipeline,
    pub job: &'a Job,
    pub step: &'a Step,
    pub env: HashMap<String, String>,
    pub workspace: String,
}

/// Outcome of running a step, independent of which executor ran it.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: None,
            stderr: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: None,
            stderr: None,
            error: Some(error.into()),
        }
    }
}
