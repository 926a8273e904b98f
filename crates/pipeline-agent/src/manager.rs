//! Agent manager (C10): selects a live agent via label selector +
//! least-loaded policy, then round-trips a task through the task
//! service until it reaches a terminal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_core::plugin::{InvokeOpts, PluginRegistry};
use pipeline_core::spec::{AgentSelector, Job, Step};
use pipeline_core::taskservice::{
    CreateTaskRequest, RemoteTaskStatus, TaskService, TranslatedExpression,
};
use pipeline_core::{Error, Result};
use thiserror::Error as ThisError;
use tracing::{info, warn};

use crate::selector;
use crate::status_cache::{AgentStatus, AgentStatusCache};

const DEFAULT_TASK_TIMEOUT_SECS: u64 = 3600;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, ThisError)]
pub enum AgentSelectionError {
    #[error("no available agents")]
    NoneAvailable,
}

/// Result of a completed (or timed-out) agent task round-trip.
#[derive(Debug, Clone)]
pub struct AgentDispatchOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
}

pub struct AgentManager {
    cache: Arc<AgentStatusCache>,
    task_service: Arc<dyn TaskService>,
    plugin_registry: Arc<dyn PluginRegistry>,
}

impl AgentManager {
    pub fn new(
        cache: Arc<AgentStatusCache>,
        task_service: Arc<dyn TaskService>,
        plugin_registry: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            cache,
            task_service,
            plugin_registry,
        }
    }

    pub fn cache(&self) -> &Arc<AgentStatusCache> {
        &self.cache
    }

    /// Among live agents, apply the selector then pick the one with the
    /// least `running_jobs_count`; ties broken by cache iteration order.
    /// An empty selector picks the first live agent (§9 open question).
    pub fn select_agent(&self, sel: &AgentSelector) -> Result<AgentStatus> {
        let candidates = self.cache.live_agents(Utc::now());
        let matching: Vec<AgentStatus> = if sel.is_empty() {
            candidates
        } else {
            candidates
                .into_iter()
                .filter(|a| selector::matches(sel, &a.labels))
                .collect()
        };

        matching
            .into_iter()
            .min_by_key(|a| a.running_jobs_count)
            .ok_or_else(|| Error::AgentSelectionError(AgentSelectionError::NoneAvailable.to_string()))
    }

    /// Full task round-trip for one step: translate, create, poll,
    /// cancel-on-timeout.
    pub async fn dispatch(
        &self,
        pipeline_namespace: &str,
        job: &Job,
        step: &Step,
        step_index: usize,
        env: &HashMap<String, String>,
        workspace: &str,
    ) -> Result<AgentDispatchOutcome> {
        let selector = step.agent_selector.clone().unwrap_or_default();
        let agent = self.select_agent(&selector)?;

        let timeout_secs = step
            .timeout
            .as_deref()
            .and_then(|t| humantime::parse_duration(t).ok())
            .map(|d| d.as_secs())
            .unwrap_or(DEFAULT_TASK_TIMEOUT_SECS);

        let job_id = format!("{}-{}-{}", pipeline_namespace, job.name, step.name);
        let plugin_name = step.uses.split('@').next().unwrap_or(&step.uses).to_string();
        let action = step.action.clone().unwrap_or_else(|| "Execute".to_string());

        let commands = self
            .build_commands(&plugin_name, &action, step, workspace)
            .await;

        let mut task_env = env.clone();
        task_env.insert("PLUGIN_NAME".to_string(), plugin_name.clone());
        task_env.insert("PLUGIN_ACTION".to_string(), action.clone());
        task_env.insert(
            "PLUGIN_PARAMS".to_string(),
            serde_json::to_string(&step.args).unwrap_or_default(),
        );

        let label_selector: Vec<TranslatedExpression> = selector
            .match_expressions
            .iter()
            .map(TranslatedExpression::from)
            .collect();

        let request = CreateTaskRequest {
            job_id: job_id.clone(),
            name: step.name.clone(),
            pipeline_id: pipeline_namespace.to_string(),
            stage: step_index,
            commands,
            env: task_env,
            workspace: workspace.to_string(),
            timeout_seconds: timeout_secs,
            label_selector,
            plugins: vec![plugin_name.clone()],
        };

        info!(agent_id = %agent.agent_id, job_id = %job_id, "dispatching task to agent");
        let created = self.task_service.create_task(request).await?;
        if !created.success {
            return Err(Error::TaskServiceError(created.message));
        }

        self.poll_until_terminal(&created.task_id, timeout_secs).await
    }

    async fn poll_until_terminal(
        &self,
        task_id: &str,
        timeout_secs: u64,
    ) -> Result<AgentDispatchOutcome> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if tokio::time::Instant::now() >= deadline {
                warn!(task_id, "task execution timeout, cancelling");
                let _ = self
                    .task_service
                    .cancel_task(task_id, "task execution timeout")
                    .await;
                return Err(Error::Timeout(format!(
                    "task `{task_id}` exceeded {timeout_secs}s"
                )));
            }

            let resp = self.task_service.get_task(task_id).await?;
            let task = resp.task;

            if task.status.is_terminal() {
                return Ok(AgentDispatchOutcome {
                    success: matches!(task.status, RemoteTaskStatus::Success),
                    exit_code: task.exit_code,
                    error: task.error_message,
                    started_at_ms: task.started_at_ms,
                    finished_at_ms: task.finished_at_ms,
                });
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    /// Builds the remote command list: plugin-supplied via
    /// `BuildCommands`, else a `shell` materialization, else a generic
    /// placeholder.
    async fn build_commands(
        &self,
        plugin_name: &str,
        action: &str,
        step: &Step,
        workspace: &str,
    ) -> Vec<String> {
        let params = serde_json::to_value(&step.args).unwrap_or(serde_json::Value::Null);
        let opts = InvokeOpts {
            workspace: workspace.to_string(),
            env: HashMap::new(),
            timeout_seconds: None,
            dry_run: true,
            build_for_agent: true,
        };

        if let Ok(plugin) = self.plugin_registry.get(plugin_name).await {
            if let Ok(Some(commands)) = plugin.build_commands(params.clone(), opts).await {
                return commands;
            }
        }

        if plugin_name == "shell" {
            if let Some(command) = step.args.get("command").and_then(|v| v.as_str()) {
                return vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()];
            }
            if let Some(script) = step.args.get("script").and_then(|v| v.as_str()) {
                return vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()];
            }
        }

        vec![
            "plugin".to_string(),
            "execute".to_string(),
            "--plugin".to_string(),
            plugin_name.to_string(),
            "--action".to_string(),
            action.to_string(),
        ]
    }
}
