//! Hand-written fakes for the three collaborator boundaries, used by
//! integration tests and available to downstream crates that want to
//! exercise the engine without real plugins or a real task service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_core::Result;
use pipeline_core::plugin::{InvokeOpts, InvokeResult, Plugin, PluginRegistry};
use pipeline_core::taskservice::{
    AgentService, CreateTaskRequest, CreateTaskResponse, GetTaskResponse, RemoteTask,
    RemoteTaskStatus, TaskService,
};

/// A plugin whose behavior is scripted per action name.
pub struct FakePlugin {
    name: String,
    invocations: Mutex<Vec<(String, serde_json::Value)>>,
    fail_on: Mutex<Vec<String>>,
    fail_count: AtomicU32,
    fail_n_times: u32,
}

impl FakePlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: Mutex::new(Vec::new()),
            fail_on: Mutex::new(Vec::new()),
            fail_count: AtomicU32::new(0),
            fail_n_times: 0,
        }
    }

    /// Fail every invocation whose action is in `actions`.
    pub fn failing_on(mut self, actions: &[&str]) -> Self {
        self.fail_on = Mutex::new(actions.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Fail the first `n` invocations regardless of action, then succeed.
    pub fn failing_first_n(mut self, n: u32) -> Self {
        self.fail_n_times = n;
        self
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }
}

#[async_trait]
impl Plugin for FakePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        action: &str,
        params: serde_json::Value,
        _opts: InvokeOpts,
    ) -> Result<InvokeResult> {
        self.invocations.lock().push((action.to_string(), params));

        if self.fail_on.lock().iter().any(|a| a == action) {
            return Ok(InvokeResult {
                success: Some(false),
                ..Default::default()
            });
        }

        if self.fail_count.fetch_add(1, Ordering::SeqCst) < self.fail_n_times {
            return Ok(InvokeResult {
                success: Some(false),
                ..Default::default()
            });
        }

        Ok(InvokeResult {
            success: Some(true),
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

/// A registry backed by a fixed map of plugin name to plugin.
pub struct FakePluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl FakePluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }
}

impl Default for FakePluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginRegistry for FakePluginRegistry {
    async fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| pipeline_core::Error::PluginNotFound(name.to_string()))
    }
}

/// A task service that resolves every created task to `Success`
/// immediately, or can be configured to return a fixed terminal state.
pub struct FakeTaskService {
    terminal_status: RemoteTaskStatus,
    cancelled: Mutex<Vec<String>>,
}

impl FakeTaskService {
    pub fn new() -> Self {
        Self {
            terminal_status: RemoteTaskStatus::Success,
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(status: RemoteTaskStatus) -> Self {
        Self {
            terminal_status: status,
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelled_tasks(&self) -> Vec<String> {
        self.cancelled.lock().clone()
    }
}

impl Default for FakeTaskService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskService for FakeTaskService {
    async fn create_task(&self, req: CreateTaskRequest) -> Result<CreateTaskResponse> {
        Ok(CreateTaskResponse {
            success: true,
            message: "accepted".to_string(),
            task_id: req.job_id,
        })
    }

    async fn get_task(&self, _id: &str) -> Result<GetTaskResponse> {
        Ok(GetTaskResponse {
            success: true,
            message: "ok".to_string(),
            task: RemoteTask {
                status: self.terminal_status,
                exit_code: if self.terminal_status == RemoteTaskStatus::Success {
                    Some(0)
                } else {
                    Some(1)
                },
                error_message: if self.terminal_status == RemoteTaskStatus::Success {
                    None
                } else {
                    Some(format!("task ended in {:?}", self.terminal_status))
                },
                started_at_ms: Some(0),
                finished_at_ms: Some(1),
            },
        })
    }

    async fn cancel_task(&self, id: &str, _reason: &str) -> Result<()> {
        self.cancelled.lock().push(id.to_string());
        Ok(())
    }
}

pub struct FakeAgentService;

#[async_trait]
impl AgentService for FakeAgentService {
    async fn cancel_task(&self, _agent_id: &str, _job_id: &str, _reason: &str) -> Result<()> {
        Ok(())
    }
}
