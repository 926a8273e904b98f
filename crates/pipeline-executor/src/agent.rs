//! Agent executor: delegates a step to the remote agent round-trip.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_agent::AgentManager;
use pipeline_core::Result;

use crate::registry::StepExecutor;
use crate::request::{ExecutionRequest, StepOutcome};

pub struct AgentExecutor {
    manager: Arc<AgentManager>,
}

impl AgentExecutor {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl StepExecutor for AgentExecutor {
    fn name(&self) -> &str {
        "agent"
    }

    fn can_execute(&self, req: &ExecutionRequest<'_>) -> bool {
        req.step.run_on_agent
    }

    async fn execute(&self, req: &ExecutionRequest<'_>) -> Result<StepOutcome> {
        let step_index = req
            .job
            .steps
            .iter()
            .position(|s| s.name == req.step.name)
            .unwrap_or(0);

        let outcome = self
            .manager
            .dispatch(
                &req.pipeline.namespace,
                req.job,
                req.step,
                step_index,
                &req.env,
                &req.workspace,
            )
            .await?;

        Ok(StepOutcome {
            success: outcome.success,
            exit_code: outcome.exit_code,
            stdout: None,
            stderr: None,
            error: outcome.error,
        })
    }
}
