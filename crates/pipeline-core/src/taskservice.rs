//! Agent/task service boundary (§6).
//!
//! `TaskService.Create/Get/Cancel` and `AgentService.Heartbeat/Cancel`
//! are implemented outside the kernel (a remote RPC surface); this
//! module only names the interface the agent manager consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::spec::{MatchExpression, SelectorOperator};

/// A request to create a remote task, translated from a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub job_id: String,
    pub name: String,
    pub pipeline_id: String,
    pub stage: usize,
    pub commands: Vec<String>,
    pub env: HashMap<String, String>,
    pub workspace: String,
    pub timeout_seconds: u64,
    pub label_selector: Vec<TranslatedExpression>,
    pub plugins: Vec<String>,
}

/// A `MatchExpression` translated to the wire format the task service
/// understands (operator spelled out, no internal enum leakage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedExpression {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

impl From<&MatchExpression> for TranslatedExpression {
    fn from(expr: &MatchExpression) -> Self {
        let operator = match expr.operator {
            SelectorOperator::In => "In",
            SelectorOperator::NotIn => "NotIn",
            SelectorOperator::Exists => "Exists",
            SelectorOperator::NotExists => "NotExists",
            SelectorOperator::Gt => "Gt",
            SelectorOperator::Lt => "Lt",
        };
        Self {
            key: expr.key.clone(),
            operator: operator.to_string(),
            values: expr.values.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub success: bool,
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTaskStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
    Timeout,
}

impl RemoteTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RemoteTaskStatus::Success
                | RemoteTaskStatus::Failed
                | RemoteTaskStatus::Cancelled
                | RemoteTaskStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub status: RemoteTaskStatus,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskResponse {
    pub success: bool,
    pub message: String,
    pub task: RemoteTask,
}

/// `TaskService.Create/Get/Cancel`.
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, req: CreateTaskRequest) -> Result<CreateTaskResponse>;
    async fn get_task(&self, id: &str) -> Result<GetTaskResponse>;
    async fn cancel_task(&self, id: &str, reason: &str) -> Result<()>;
}

/// `AgentService.Heartbeat/Cancel`. Heartbeats are observed, not called,
/// by the kernel (an external process pushes them in); `cancel_task` is
/// the one call the kernel makes outward.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn cancel_task(&self, agent_id: &str, job_id: &str, reason: &str) -> Result<()>;
}
