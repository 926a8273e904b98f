//! Step runner (C8 — step level): `when`, timeout, retry-with-delay,
//! then dispatch through the executor registry.

use pipeline_context::ExecutionContext;
use pipeline_core::Result;
use pipeline_core::spec::{Job, Pipeline, Step};
use pipeline_executor::{ExecutionRequest, ExecutorRegistry, StepOutcome};
use pipeline_parser::expr;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum StepRunOutcome {
    Skipped,
    Succeeded,
    /// Failed but `continue_on_error` allowed the job to proceed.
    FailedContinued { error: String },
    Failed { error: String },
}

impl StepRunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepRunOutcome::Failed { .. })
    }
}

pub async fn run_step(
    ctx: &ExecutionContext,
    pipeline: &Pipeline,
    job: &Job,
    step: &Step,
    registry: &ExecutorRegistry,
) -> Result<StepRunOutcome> {
    if let Some(when) = &step.when {
        let env = json!({ "job": { "name": job.name }, "step": { "name": step.name, "uses": step.uses } });
        match expr::eval(when, &env) {
            Ok(value) if !value.truthy() => {
                info!(job = %job.name, step = %step.name, "step skipped by when condition");
                return Ok(StepRunOutcome::Skipped);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job = %job.name, step = %step.name, error = %e, "when condition failed to evaluate");
                return Ok(StepRunOutcome::Failed {
                    error: format!("when condition error: {e}"),
                });
            }
        }
    }

    let timeout = step
        .timeout
        .as_deref()
        .and_then(|t| humantime::parse_duration(t).ok());

    let attempts = job.retry.as_ref().map(|r| r.max_attempts.max(1)).unwrap_or(1);
    let delay = job
        .retry
        .as_ref()
        .and_then(|r| r.delay.as_deref())
        .and_then(|d| humantime::parse_duration(d).ok());

    let env = ctx.effective_env(&job.env, &step.env);
    let workspace = ctx.workspace_root.to_string_lossy().to_string();

    let mut last_error = String::new();
    for attempt in 1..=attempts {
        let request = ExecutionRequest {
            pipeline,
            job,
            step,
            env: env.clone(),
            workspace: workspace.clone(),
        };

        let attempt_result = match timeout {
            Some(d) => match tokio::time::timeout(d, registry.execute(&request)).await {
                Ok(inner) => inner,
                Err(_) => Err(pipeline_core::Error::Timeout(format!(
                    "step `{}` exceeded {:?}",
                    step.name, d
                ))),
            },
            None => registry.execute(&request).await,
        };

        match attempt_result {
            Ok(outcome) if outcome.success => return Ok(StepRunOutcome::Succeeded),
            Ok(outcome) => {
                last_error = outcome
                    .error
                    .unwrap_or_else(|| "step reported failure".to_string());
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }

        warn!(job = %job.name, step = %step.name, attempt, attempts, error = %last_error, "step attempt failed");

        if attempt < attempts {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
        }
    }

    if step.continue_on_error {
        Ok(StepRunOutcome::FailedContinued { error: last_error })
    } else {
        Ok(StepRunOutcome::Failed { error: last_error })
    }
}

/// Convert an executor `StepOutcome` straight to a run outcome, used by
/// hooks (source/target) that don't go through retry/when handling.
pub fn outcome_to_run_outcome(outcome: StepOutcome) -> StepRunOutcome {
    if outcome.success {
        StepRunOutcome::Succeeded
    } else {
        StepRunOutcome::Failed {
            error: outcome.error.unwrap_or_else(|| "hook failed".to_string()),
        }
    }
}
