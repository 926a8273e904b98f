//! Local plugin executor: invokes a step's plugin in-process via the
//! plugin registry boundary.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_core::Result;
use pipeline_core::plugin::{InvokeOpts, PluginRegistry};

use crate::registry::StepExecutor;
use crate::request::{ExecutionRequest, StepOutcome};

pub struct LocalPluginExecutor {
    registry: Arc<dyn PluginRegistry>,
}

impl LocalPluginExecutor {
    pub fn new(registry: Arc<dyn PluginRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StepExecutor for LocalPluginExecutor {
    fn name(&self) -> &str {
        "local-plugin"
    }

    fn can_execute(&self, req: &ExecutionRequest<'_>) -> bool {
        !req.step.run_on_agent
    }

    async fn execute(&self, req: &ExecutionRequest<'_>) -> Result<StepOutcome> {
        let plugin_name = req.step.uses.split('@').next().unwrap_or(&req.step.uses);
        let plugin = self.registry.get(plugin_name).await?;
        let action = req.step.action.as_deref().unwrap_or("Execute");

        let params = serde_json::to_value(&req.step.args).unwrap_or(serde_json::Value::Null);
        let opts = InvokeOpts {
            workspace: req.workspace.clone(),
            env: req.env.clone(),
            timeout_seconds: None,
            dry_run: false,
            build_for_agent: false,
        };

        let result = plugin.invoke(action, params, opts).await?;
        let succeeded = result.is_success();
        Ok(StepOutcome {
            success: succeeded,
            exit_code: result.exit_code.or(if succeeded { Some(0) } else { None }),
            stdout: result.stdout,
            stderr: result.stderr,
            error: if succeeded {
                None
            } else {
                Some(format!("plugin `{plugin_name}` reported failure"))
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::plugin::{InvokeResult, Plugin};
    use pipeline_core::spec::{Job, Pipeline, Step};
    use std::collections::HashMap;

    struct AlwaysSucceeds;
    #[async_trait]
    impl Plugin for AlwaysSucceeds {
        fn name(&self) -> &str {
            "noop"
        }
        async fn invoke(
            &self,
            _action: &str,
            _params: serde_json::Value,
            _opts: InvokeOpts,
        ) -> Result<InvokeResult> {
            Ok(InvokeResult {
                success: Some(true),
                ..Default::default()
            })
        }
    }

    struct AlwaysSucceedsRegistry;
    #[async_trait]
    impl PluginRegistry for AlwaysSucceedsRegistry {
        async fn get(&self, _name: &str) -> Result<Arc<dyn Plugin>> {
            Ok(Arc::new(AlwaysSucceeds))
        }
    }

    fn pipeline_job_step() -> (Pipeline, Job, Step) {
        let step = Step {
            name: "s".into(),
            uses: "noop@1.0.0".into(),
            action: None,
            args: HashMap::new(),
            env: HashMap::new(),
            continue_on_error: false,
            timeout: None,
            when: None,
            agent_selector: None,
            run_on_agent: false,
        };
        let job = Job {
            name: "a".into(),
            description: None,
            env: HashMap::new(),
            timeout: None,
            retry: None,
            when: None,
            concurrency: None,
            depends_on: vec![],
            source: None,
            approval: None,
            target: None,
            notify: None,
            triggers: vec![],
            steps: vec![step.clone()],
        };
        let pipeline = Pipeline {
            namespace: "p".into(),
            version: None,
            variables: HashMap::new(),
            jobs: vec![job.clone()],
        };
        (pipeline, job, step)
    }

    #[tokio::test]
    async fn strips_version_suffix_before_lookup() {
        let (pipeline, job, step) = pipeline_job_step();
        let executor = LocalPluginExecutor::new(Arc::new(AlwaysSucceedsRegistry));
        let req = ExecutionRequest {
            pipeline: &pipeline,
            job: &job,
            step: &step,
            env: HashMap::new(),
            workspace: "/tmp".into(),
        };
        let outcome = executor.execute(&req).await.unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn does_not_handle_agent_dispatched_steps() {
        let (pipeline, job, mut step) = pipeline_job_step();
        step.run_on_agent = true;
        let executor = LocalPluginExecutor::new(Arc::new(AlwaysSucceedsRegistry));
        let req = ExecutionRequest {
            pipeline: &pipeline,
            job: &job,
            step: &step,
            env: HashMap::new(),
            workspace: "/tmp".into(),
        };
        assert!(!executor.can_execute(&req));
    }
}
