//! Job runner (C8 — job level): `when`, timeout, source hook, approval
//! poll, step sequence, target hook, notify.

use std::time::Duration;

use pipeline_context::ExecutionContext;
use pipeline_core::plugin::InvokeOpts;
use pipeline_core::spec::{ApprovalKind, Job, Pipeline};
use pipeline_core::{Error, Result};
use pipeline_executor::ExecutorRegistry;
use pipeline_parser::expr;
use serde_json::json;
use tracing::{error, info, warn};

use crate::step_runner::{self, StepRunOutcome};

const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
const APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunOutcome {
    Skipped,
    Succeeded,
    Failed { error: String },
}

pub async fn run_job(
    ctx: &ExecutionContext,
    pipeline: &Pipeline,
    job: &Job,
    registry: &ExecutorRegistry,
) -> JobRunOutcome {
    ctx.set_cursor(Some(job.name.clone()), None);

    if let Some(when) = &job.when {
        let env = json!({ "job": { "name": job.name, "description": job.description } });
        match expr::eval(when, &env) {
            Ok(value) if !value.truthy() => {
                info!(job = %job.name, "job skipped by when condition");
                return JobRunOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => {
                let msg = format!("when condition error: {e}");
                ctx.record_error(msg.clone());
                return JobRunOutcome::Failed { error: msg };
            }
        }
    }

    let timeout = job
        .timeout
        .as_deref()
        .and_then(|t| humantime::parse_duration(t).ok());

    let run = run_job_body(ctx, pipeline, job, registry);
    let result = match timeout {
        Some(d) => match tokio::time::timeout(d, run).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout(format!("job `{}` exceeded {:?}", job.name, d))),
        },
        None => run.await,
    };

    match result {
        Ok(()) => {
            send_notify(ctx, job, true).await;
            JobRunOutcome::Succeeded
        }
        Err(e) => {
            let msg = e.to_string();
            ctx.record_error(msg.clone());
            send_notify(ctx, job, false).await;
            JobRunOutcome::Failed { error: msg }
        }
    }
}

async fn run_job_body(
    ctx: &ExecutionContext,
    pipeline: &Pipeline,
    job: &Job,
    registry: &ExecutorRegistry,
) -> Result<()> {
    if let Some(source) = &job.source {
        let params = json!({ "repo": source.repo, "branch": source.branch, "auth": source.auth });
        let opts = InvokeOpts {
            workspace: ctx.workspace_root.to_string_lossy().to_string(),
            ..Default::default()
        };
        let plugin_name = format!("source.{:?}", source.kind).to_lowercase();
        let plugin = ctx.collaborators.plugin_registry.get(&plugin_name).await?;
        let result = plugin.invoke("checkout", params, opts).await?;
        if !result.is_success() {
            return Err(Error::Internal(format!(
                "source hook `{plugin_name}` failed for job `{}`",
                job.name
            )));
        }
    }

    if let Some(approval) = &job.approval {
        if approval.required {
            run_approval(ctx, job, approval).await?;
        }
    }

    for step in &job.steps {
        ctx.set_cursor(Some(job.name.clone()), Some(step.name.clone()));
        let outcome = step_runner::run_step(ctx, pipeline, job, step, registry).await?;
        match outcome {
            StepRunOutcome::Skipped | StepRunOutcome::Succeeded | StepRunOutcome::FailedContinued { .. } => {}
            StepRunOutcome::Failed { error } => {
                return Err(Error::Internal(format!(
                    "step `{}` of job `{}` failed: {error}",
                    step.name, job.name
                )));
            }
        }
    }

    if let Some(target) = &job.target {
        let params = json!({ "config": target.config });
        let opts = InvokeOpts {
            workspace: ctx.workspace_root.to_string_lossy().to_string(),
            ..Default::default()
        };
        let plugin_name = format!("target.{:?}", target.kind).to_lowercase();
        let plugin = ctx.collaborators.plugin_registry.get(&plugin_name).await?;
        let result = plugin.invoke("deploy", params, opts).await?;
        if !result.is_success() {
            return Err(Error::Internal(format!(
                "target hook `{plugin_name}` failed for job `{}`",
                job.name
            )));
        }
    }

    Ok(())
}

async fn run_approval(
    ctx: &ExecutionContext,
    job: &Job,
    approval: &pipeline_core::spec::Approval,
) -> Result<()> {
    if approval.kind == ApprovalKind::Auto {
        return Ok(());
    }

    let plugin_name = approval.plugin.clone().unwrap_or_else(|| "approval".to_string());
    let plugin = ctx.collaborators.plugin_registry.get(&plugin_name).await?;
    let params = serde_json::to_value(&approval.params).unwrap_or(serde_json::Value::Null);
    let opts = InvokeOpts {
        workspace: ctx.workspace_root.to_string_lossy().to_string(),
        ..Default::default()
    };

    let created = plugin.invoke("approval.create", params, opts.clone()).await?;
    if !created.is_success() {
        return Err(Error::ApprovalRejected(format!(
            "approval request for job `{}` could not be created",
            job.name
        )));
    }

    let deadline = tokio::time::Instant::now() + DEFAULT_APPROVAL_TIMEOUT;
    loop {
        if tokio::time::Instant::now() >= deadline {
            warn!(job = %job.name, "approval timed out");
            return Err(Error::ApprovalExpired);
        }

        let status = plugin
            .invoke("approval.status", serde_json::Value::Null, opts.clone())
            .await?;

        let state = status
            .extra
            .get("state")
            .and_then(|v| v.as_str())
            .unwrap_or("pending")
            .to_string();

        match state.as_str() {
            "approved" => return Ok(()),
            "rejected" => {
                let reason = status
                    .extra
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("rejected")
                    .to_string();
                return Err(Error::ApprovalRejected(reason));
            }
            "expired" => {
                warn!(job = %job.name, "approval expired");
                return Err(Error::ApprovalExpired);
            }
            _ => {}
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        tokio::time::sleep(APPROVAL_POLL_INTERVAL.min(remaining)).await;
    }
}

async fn send_notify(ctx: &ExecutionContext, job: &Job, success: bool) {
    let Some(notify) = &job.notify else { return };
    let items = if success { &notify.on_success } else { &notify.on_failure };
    for item in items {
        let opts = InvokeOpts {
            workspace: ctx.workspace_root.to_string_lossy().to_string(),
            ..Default::default()
        };
        let params = serde_json::to_value(&item.params).unwrap_or(serde_json::Value::Null);
        match ctx.collaborators.plugin_registry.get(&item.plugin).await {
            Ok(plugin) => {
                if let Err(e) = plugin.invoke(&item.action, params, opts).await {
                    warn!(job = %job.name, plugin = %item.plugin, error = %e, "notify hook failed");
                }
            }
            Err(e) => {
                error!(job = %job.name, plugin = %item.plugin, error = %e, "notify plugin not found");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_context::Collaborators;
    use pipeline_core::plugin::{InvokeResult, Plugin, PluginRegistry};
    use pipeline_core::spec::{RetryPolicy, Step};
    use pipeline_core::taskservice::{
        AgentService, CreateTaskRequest, CreateTaskResponse, GetTaskResponse, TaskService,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

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

    fn test_ctx() -> ExecutionContext {
        let pipeline = Arc::new(Pipeline {
            namespace: "p".into(),
            version: None,
            variables: HashMap::new(),
            jobs: vec![],
        });
        ExecutionContext::new(
            pipeline,
            PathBuf::from("/tmp"),
            Collaborators {
                plugin_registry: Arc::new(AlwaysSucceedsRegistry),
                task_service: Arc::new(NoopTaskService),
                agent_service: Arc::new(NoopAgentService),
            },
        )
    }

    fn simple_step() -> Step {
        Step {
            name: "s".into(),
            uses: "noop".into(),
            action: None,
            args: HashMap::new(),
            env: HashMap::new(),
            continue_on_error: false,
            timeout: None,
            when: None,
            agent_selector: None,
            run_on_agent: false,
        }
    }

    fn simple_job(steps: Vec<Step>) -> Job {
        Job {
            name: "j".into(),
            description: None,
            env: HashMap::new(),
            timeout: None,
            retry: Some(RetryPolicy {
                max_attempts: 1,
                delay: None,
            }),
            when: None,
            concurrency: None,
            depends_on: vec![],
            source: None,
            approval: None,
            target: None,
            notify: None,
            triggers: vec![],
            steps,
        }
    }

    #[tokio::test]
    async fn runs_steps_in_order_and_succeeds() {
        let ctx = test_ctx();
        let job = simple_job(vec![simple_step()]);
        let pipeline = Pipeline {
            namespace: "p".into(),
            version: None,
            variables: HashMap::new(),
            jobs: vec![job.clone()],
        };
        let registry = ExecutorRegistry::new().register(Box::new(
            pipeline_executor::LocalPluginExecutor::new(ctx.collaborators.plugin_registry.clone()),
        ));

        let outcome = run_job(&ctx, &pipeline, &job, &registry).await;
        assert_eq!(outcome, JobRunOutcome::Succeeded);
    }

    #[tokio::test]
    async fn when_false_skips_job() {
        let ctx = test_ctx();
        let mut job = simple_job(vec![simple_step()]);
        job.when = Some("job.name == \"other\"".to_string());
        let pipeline = Pipeline {
            namespace: "p".into(),
            version: None,
            variables: HashMap::new(),
            jobs: vec![job.clone()],
        };
        let registry = ExecutorRegistry::new().register(Box::new(
            pipeline_executor::LocalPluginExecutor::new(ctx.collaborators.plugin_registry.clone()),
        ));

        let outcome = run_job(&ctx, &pipeline, &job, &registry).await;
        assert_eq!(outcome, JobRunOutcome::Skipped);
    }
}
