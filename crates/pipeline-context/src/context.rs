//! Per-run execution context (C6).
//!
//! Owns everything a job/step runner needs that isn't itself job/step
//! data: identity, workspace, effective environment, status machine,
//! stores, accumulated errors, and collaborator handles. Exclusively
//! owned by the reconciler while a run is active; returned to the
//! context pool when the run terminates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::ResourceId;
use pipeline_core::plugin::PluginRegistry;
use pipeline_core::spec::Pipeline;
use pipeline_core::taskservice::{AgentService, TaskService};

use crate::status::{InvalidTransition, PipelineStatus, StatusMachine, TransitionRecord};

/// Collaborator handles a context carries but never calls back into
/// itself: the ownership direction is strictly context -> collaborator.
#[derive(Clone)]
pub struct Collaborators {
    pub plugin_registry: Arc<dyn PluginRegistry>,
    pub task_service: Arc<dyn TaskService>,
    pub agent_service: Arc<dyn AgentService>,
}

/// Current job/step pointers, used by `when` evaluation and logging.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub job: Option<String>,
    pub step: Option<String>,
}

/// A unit of pre/post processing wrapped around step execution.
/// Middleware never mutates the pipeline spec; it may read and annotate
/// the context's stores.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;
    fn before_step(&self, ctx: &ExecutionContext, job: &str, step: &str);
    fn after_step(&self, ctx: &ExecutionContext, job: &str, step: &str, success: bool);
}

struct Inner {
    status: StatusMachine,
    keys: HashMap<String, serde_json::Value>,
    transient: HashMap<String, serde_json::Value>,
    errors: Vec<String>,
    aborted: bool,
    abort_error: Option<String>,
    cursor: Cursor,
    started_at: Option<DateTime<Utc>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            status: StatusMachine::new(),
            keys: HashMap::new(),
            transient: HashMap::new(),
            errors: Vec::new(),
            aborted: false,
            abort_error: None,
            cursor: Cursor::default(),
            started_at: None,
        }
    }
}

/// The execution context for one pipeline run.
pub struct ExecutionContext {
    pub id: ResourceId,
    pub pipeline: Arc<Pipeline>,
    pub workspace_root: PathBuf,
    pub environment: HashMap<String, String>,
    middleware: Vec<Arc<dyn Middleware>>,
    pub collaborators: Collaborators,
    inner: RwLock<Inner>,
}

impl ExecutionContext {
    pub fn new(
        pipeline: Arc<Pipeline>,
        workspace_root: PathBuf,
        collaborators: Collaborators,
    ) -> Self {
        let mut environment: HashMap<String, String> = pipeline.variables.clone();
        environment.extend(std::env::vars());
        Self {
            id: ResourceId::new(),
            pipeline,
            workspace_root,
            environment,
            middleware: Vec::new(),
            collaborators,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn with_middleware(mut self, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Effective environment for a step: pipeline vars < job env < step
    /// env, later entries winning.
    pub fn effective_env(
        &self,
        job_env: &HashMap<String, String>,
        step_env: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut out = self.environment.clone();
        out.extend(job_env.clone());
        out.extend(step_env.clone());
        out
    }

    pub fn status(&self) -> PipelineStatus {
        self.inner.read().status.status()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.inner.read().status.end_time()
    }

    pub fn history(&self) -> Vec<TransitionRecord> {
        self.inner.read().status.history().to_vec()
    }

    pub fn transition(&self, to: PipelineStatus) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.write();
        if inner.started_at.is_none() && to == PipelineStatus::Running {
            inner.started_at = Some(Utc::now());
        }
        inner.status.transition(to)
    }

    pub fn set_status(&self, to: PipelineStatus) {
        self.inner.write().status.set_status(to);
    }

    pub fn abort(&self, error: Option<String>) {
        let mut inner = self.inner.write();
        inner.aborted = true;
        inner.abort_error = error;
        inner.status.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.read().aborted
    }

    pub fn abort_error(&self) -> Option<String> {
        self.inner.read().abort_error.clone()
    }

    pub fn record_error(&self, error: impl Into<String>) {
        self.inner.write().errors.push(error.into());
    }

    pub fn errors(&self) -> Vec<String> {
        self.inner.read().errors.clone()
    }

    pub fn set_cursor(&self, job: Option<String>, step: Option<String>) {
        let mut inner = self.inner.write();
        inner.cursor.job = job;
        inner.cursor.step = step;
    }

    pub fn cursor(&self) -> Cursor {
        self.inner.read().cursor.clone()
    }

    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.write().keys.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().keys.get(key).cloned()
    }

    pub fn put_transient(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.write().transient.insert(key.into(), value);
    }

    pub fn get_transient(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().transient.get(key).cloned()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().started_at
    }

    /// Clears mutable run state so the context can be reused for a
    /// different pipeline run of the same shape. Does not touch
    /// identity, workspace root, environment, or collaborators.
    pub fn reset_for_reuse(&self) {
        let mut inner = self.inner.write();
        inner.keys.clear();
        inner.transient.clear();
        inner.errors.clear();
        inner.aborted = false;
        inner.abort_error = None;
        inner.cursor = Cursor::default();
        inner.started_at = None;
        inner.status.reset_for_reuse();
    }
}
