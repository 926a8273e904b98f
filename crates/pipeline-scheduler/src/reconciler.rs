//! Reconciler (C7): single-threaded control loop driving a pipeline run
//! to completion by repeatedly asking the DAG for schedulable jobs and
//! submitting them to the worker pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use pipeline_context::{ExecutionContext, PipelineStatus};
use pipeline_core::Result;
use pipeline_core::dag::Dag;
use pipeline_core::spec::Pipeline;
use pipeline_executor::ExecutorRegistry;
use pipeline_pool::{Task, TaskOutcome, WorkerPool};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::job_runner::{self, JobRunOutcome};

const FALLBACK_TICK: Duration = Duration::from_secs(1);

/// Outcome of a full pipeline run.
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub job_results: HashMap<String, JobRunOutcome>,
}

/// Drives `pipeline` to completion using `ctx`'s collaborators,
/// dispatching ready jobs to `pool`.
pub async fn run(
    ctx: Arc<ExecutionContext>,
    pipeline: Arc<Pipeline>,
    pool: Arc<WorkerPool>,
    registry: Arc<ExecutorRegistry>,
) -> Result<PipelineOutcome> {
    let mut dag = Dag::build(&pipeline).map_err(|e| pipeline_core::Error::InvalidInput(e.to_string()))?;

    ctx.transition(PipelineStatus::Running).ok();

    let mut completed: HashSet<String> = HashSet::new();
    let mut in_flight: HashSet<String> = HashSet::new();
    let mut busy_keys: HashSet<String> = HashSet::new();
    let mut results: HashMap<String, JobRunOutcome> = HashMap::new();
    let total = dag.len();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(String, JobRunOutcome)>();

    while completed.len() < total {
        if ctx.is_aborted() {
            break;
        }

        let schedulable = dag.schedulable(&completed);
        for name in schedulable {
            if in_flight.contains(&name) {
                continue;
            }
            let job = match pipeline.job(&name) {
                Some(j) => j,
                None => continue,
            };
            if let Some(key) = &job.concurrency {
                if busy_keys.contains(key) {
                    continue;
                }
                busy_keys.insert(key.clone());
            }

            in_flight.insert(name.clone());
            if let Some(task) = dag.task_mut(&name) {
                task.state = pipeline_core::dag::TaskState::Running;
                task.started_at = Some(chrono::Utc::now());
            }

            let ctx = ctx.clone();
            let pipeline = pipeline.clone();
            let job = job.clone();
            let registry = registry.clone();
            let done_tx = done_tx.clone();
            let job_name = name.clone();

            pool.submit(
                Task::new(name.clone(), Box::pin(async move {
                    let outcome = job_runner::run_job(&ctx, &pipeline, &job, &registry).await;
                    let succeeded = !matches!(outcome, JobRunOutcome::Failed { .. });
                    let _ = done_tx.send((job_name, outcome));
                    if succeeded {
                        TaskOutcome::Succeeded
                    } else {
                        TaskOutcome::Failed
                    }
                })),
                0,
            );
        }

        let got = tokio::select! {
            msg = done_rx.recv() => msg,
            _ = tokio::time::sleep(FALLBACK_TICK) => None,
        };

        if let Some((name, outcome)) = got {
            in_flight.remove(&name);
            if let Some(job) = pipeline.job(&name) {
                if let Some(key) = &job.concurrency {
                    busy_keys.remove(key);
                }
            }
            if let Some(task) = dag.task_mut(&name) {
                task.completed_at = Some(chrono::Utc::now());
                task.state = match &outcome {
                    JobRunOutcome::Succeeded => pipeline_core::dag::TaskState::Succeeded,
                    JobRunOutcome::Skipped => pipeline_core::dag::TaskState::Skipped,
                    JobRunOutcome::Failed { error } => {
                        task.error = Some(error.clone());
                        pipeline_core::dag::TaskState::Failed
                    }
                };
            }
            if let JobRunOutcome::Failed { error } = &outcome {
                ctx.record_error(format!("job `{name}` failed: {error}"));
                warn!(job = %name, error = %error, "job failed");
            } else {
                info!(job = %name, "job completed");
            }
            completed.insert(name.clone());
            results.insert(name, outcome);
        }
    }

    let final_status = if ctx.is_aborted() {
        PipelineStatus::Canceled
    } else if results.values().any(|r| matches!(r, JobRunOutcome::Failed { .. })) {
        PipelineStatus::Failed
    } else {
        PipelineStatus::Success
    };
    ctx.transition(final_status).ok();

    Ok(PipelineOutcome {
        status: final_status,
        job_results: results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_context::Collaborators;
    use pipeline_core::plugin::{InvokeOpts, InvokeResult, Plugin, PluginRegistry};
    use pipeline_core::spec::{Job, RetryPolicy, Step};
    use pipeline_core::taskservice::{
        AgentService, CreateTaskRequest, CreateTaskResponse, GetTaskResponse, TaskService,
    };
    use std::path::PathBuf;

    struct AlwaysSucceeds;
    #[async_trait::async_trait]
    impl Plugin for AlwaysSucceeds {
        fn name(&self) -> &str {
            "noop"
        }
        async fn invoke(
            &self,
            _a: &str,
            _p: serde_json::Value,
            _o: InvokeOpts,
        ) -> Result<InvokeResult> {
            Ok(InvokeResult {
                success: Some(true),
                ..Default::default()
            })
        }
    }
    struct AlwaysSucceedsRegistry;
    #[async_trait::async_trait]
    impl PluginRegistry for AlwaysSucceedsRegistry {
        async fn get(&self, _n: &str) -> Result<Arc<dyn Plugin>> {
            Ok(Arc::new(AlwaysSucceeds))
        }
    }
    struct NoopTaskService;
    #[async_trait::async_trait]
    impl TaskService for NoopTaskService {
        async fn create_task(&self, _r: CreateTaskRequest) -> Result<CreateTaskResponse> {
            unimplemented!()
        }
        async fn get_task(&self, _i: &str) -> Result<GetTaskResponse> {
            unimplemented!()
        }
        async fn cancel_task(&self, _i: &str, _r: &str) -> Result<()> {
            unimplemented!()
        }
    }
    struct NoopAgentService;
    #[async_trait::async_trait]
    impl AgentService for NoopAgentService {
        async fn cancel_task(&self, _a: &str, _j: &str, _r: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn step() -> Step {
        Step {
            name: "s".into(),
            uses: "noop".into(),
            action: None,
            args: Default::default(),
            env: Default::default(),
            continue_on_error: false,
            timeout: None,
            when: None,
            agent_selector: None,
            run_on_agent: false,
        }
    }

    fn job(name: &str, deps: &[&str]) -> Job {
        Job {
            name: name.to_string(),
            description: None,
            env: Default::default(),
            timeout: None,
            retry: Some(RetryPolicy {
                max_attempts: 1,
                delay: None,
            }),
            when: None,
            concurrency: None,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            source: None,
            approval: None,
            target: None,
            notify: None,
            triggers: vec![],
            steps: vec![step()],
        }
    }

    #[tokio::test]
    async fn runs_linear_pipeline_to_success() {
        let pipeline = Arc::new(Pipeline {
            namespace: "p".into(),
            version: None,
            variables: Default::default(),
            jobs: vec![job("a", &[]), job("b", &["a"])],
        });
        let ctx = Arc::new(ExecutionContext::new(
            pipeline.clone(),
            PathBuf::from("/tmp"),
            Collaborators {
                plugin_registry: Arc::new(AlwaysSucceedsRegistry),
                task_service: Arc::new(NoopTaskService),
                agent_service: Arc::new(NoopAgentService),
            },
        ));
        let registry = Arc::new(ExecutorRegistry::new().register(Box::new(
            pipeline_executor::LocalPluginExecutor::new(ctx.collaborators.plugin_registry.clone()),
        )));
        let pool = WorkerPool::new(4, 16, Duration::from_secs(5));

        let outcome = run(ctx, pipeline, pool.clone(), registry).await.unwrap();
        assert_eq!(outcome.status, PipelineStatus::Success);
        assert_eq!(outcome.job_results.len(), 2);
        pool.stop().await;
    }
}
