//! Facade crate (C1-top): wires the parser, DAG-driven reconciler, and
//! executor registry into a single entry point — `Engine::submit`.

pub mod testutil;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pipeline_agent::{AgentManager, AgentStatusCache};
use pipeline_context::{Collaborators, ExecutionContext};
use pipeline_executor::{AgentExecutor, ExecutorRegistry, LocalPluginExecutor};
use pipeline_pool::WorkerPool;
use pipeline_scheduler::PipelineOutcome;
use thiserror::Error;

const DEFAULT_QUEUE_SIZE: usize = 256;
const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to decode pipeline: {0}")]
    Parse(#[from] pipeline_parser::ParseError),

    #[error("pipeline failed validation: {0:?}")]
    Validation(Vec<String>),

    #[error(transparent)]
    Core(#[from] pipeline_core::Error),
}

/// Top-level entry point: owns the worker pool and collaborator
/// handles, and drives one pipeline run at a time to completion.
///
/// Cyclic references between the context, the reconciler, and the
/// executors are avoided by strict ownership direction: `Engine` owns
/// everything, the reconciler borrows a context and a registry, and
/// neither ever holds a reference back to the engine itself.
pub struct Engine {
    collaborators: Collaborators,
    workspace_root: PathBuf,
    pool: Arc<WorkerPool>,
    agent_manager: Arc<AgentManager>,
    max_workers: usize,
}

impl Engine {
    pub fn new(collaborators: Collaborators, workspace_root: PathBuf, max_workers: usize) -> Self {
        let pool = WorkerPool::new(max_workers, DEFAULT_QUEUE_SIZE, DEFAULT_WORKER_TIMEOUT);
        let agent_manager = Arc::new(AgentManager::new(
            Arc::new(AgentStatusCache::new()),
            collaborators.task_service.clone(),
            collaborators.plugin_registry.clone(),
        ));
        Self {
            collaborators,
            workspace_root,
            pool,
            agent_manager,
            max_workers,
        }
    }

    pub fn agent_manager(&self) -> &Arc<AgentManager> {
        &self.agent_manager
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn build_registry(&self) -> ExecutorRegistry {
        ExecutorRegistry::new()
            .register(Box::new(LocalPluginExecutor::new(
                self.collaborators.plugin_registry.clone(),
            )))
            .register(Box::new(AgentExecutor::new(self.agent_manager.clone())))
    }

    /// Decode, validate, and run a pipeline DSL document to completion.
    pub async fn submit(&self, dsl: &[u8]) -> Result<PipelineOutcome, EngineError> {
        let pipeline = pipeline_parser::parse_pipeline(dsl)?;

        let errors = pipeline_parser::validate_pipeline(&pipeline);
        if !errors.is_empty() {
            return Err(EngineError::Validation(
                errors.into_iter().map(|e| e.to_string()).collect(),
            ));
        }

        let pipeline = Arc::new(pipeline);
        let ctx = Arc::new(ExecutionContext::new(
            pipeline.clone(),
            self.workspace_root.join(&pipeline.namespace),
            self.collaborators.clone(),
        ));
        let registry = Arc::new(self.build_registry());

        let outcome = pipeline_scheduler::run(ctx, pipeline, self.pool.clone(), registry).await?;
        Ok(outcome)
    }

    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }
}
