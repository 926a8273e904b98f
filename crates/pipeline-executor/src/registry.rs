//! Executor registry (C9): dispatches a step to the first registered
//! executor whose `can_execute` returns true.

use async_trait::async_trait;
use pipeline_core::Result;
use thiserror::Error;

use crate::request::{ExecutionRequest, StepOutcome};

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn can_execute(&self, req: &ExecutionRequest<'_>) -> bool;
    async fn execute(&self, req: &ExecutionRequest<'_>) -> Result<StepOutcome>;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no executor matches step `{0}`")]
    NoMatch(String),
    #[error("multiple executors match step `{0}`: {1:?}")]
    Ambiguous(String, Vec<String>),
}

/// Ordered list of executors. Exactly one must match per §4.9.
pub struct ExecutorRegistry {
    executors: Vec<Box<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    pub fn register(mut self, executor: Box<dyn StepExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn dispatch_target(&self, req: &ExecutionRequest<'_>) -> Result<&dyn StepExecutor> {
        let matches: Vec<&Box<dyn StepExecutor>> =
            self.executors.iter().filter(|e| e.can_execute(req)).collect();

        match matches.len() {
            0 => Err(pipeline_core::Error::Internal(
                DispatchError::NoMatch(req.step.name.clone()).to_string(),
            )),
            1 => Ok(matches[0].as_ref()),
            _ => Err(pipeline_core::Error::Internal(
                DispatchError::Ambiguous(
                    req.step.name.clone(),
                    matches.iter().map(|e| e.name().to_string()).collect(),
                )
                .to_string(),
            )),
        }
    }

    pub async fn execute(&self, req: &ExecutionRequest<'_>) -> Result<StepOutcome> {
        let executor = self.dispatch_target(req)?;
        executor.execute(req).await
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
