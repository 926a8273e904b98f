//! Pipeline specification model.
//!
//! Typed structures for the pipeline DSL described in the wire contract.
//! This module has no behavior beyond the handful of pure accessors that
//! make the rest of the kernel more readable; parsing and validation live
//! in `pipeline-parser`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A full pipeline definition as decoded from the JSON DSL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique identifier within a tenant. `[A-Za-z0-9_-]+`.
    pub namespace: String,
    /// Optional semantic version, `M.m.p[-tag]`.
    #[serde(default)]
    pub version: Option<String>,
    /// Pipeline-scoped variables, available to the interpreter as bare
    /// names and via `env.<name>`.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Jobs in the pipeline. Must be non-empty; names must be unique.
    pub jobs: Vec<Job>,
}

/// A unit of work with dependencies, retries, and optional hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique within the pipeline. `[A-Za-z0-9_-]+`.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Duration string, e.g. `30s`, `5m`, `1h`.
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Condition expression gating the whole job.
    #[serde(default)]
    pub when: Option<String>,
    /// Opaque grouping key: jobs sharing a key run serially relative to
    /// each other (see DESIGN.md for the resolution of this open
    /// question).
    #[serde(default)]
    pub concurrency: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub approval: Option<Approval>,
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub notify: Option<Notify>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Non-empty; step names unique within the job.
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub delay: Option<String>,
}

/// An atomic invocation of a named plugin action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    /// Plugin reference: `name[@M.m.p[-tag]]`.
    pub uses: String,
    /// Defaults to the plugin's `Execute` action.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub agent_selector: Option<AgentSelector>,
    #[serde(default)]
    pub run_on_agent: bool,
}

/// Sum-typed container selecting a source plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Git,
    Artifact,
    S3,
    Custom,
}

/// Sum-typed container selecting an approval plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    #[serde(rename = "type")]
    pub kind: ApprovalKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalKind {
    Manual,
    Auto,
}

/// Sum-typed container selecting a target (deploy) plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    K8s,
    Vm,
    Docker,
    S3,
    Custom,
}

/// Independent on-success/on-failure notification hooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notify {
    #[serde(default)]
    pub on_success: Vec<NotifyItem>,
    #[serde(default)]
    pub on_failure: Vec<NotifyItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyItem {
    pub plugin: String,
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// What can start a pipeline run. Not evaluated by the core (the edge
/// decides when to submit a run); carried through for completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Trigger {
    Push {
        #[serde(default)]
        branches: Vec<String>,
    },
    Schedule {
        cron: String,
    },
    Manual,
    Webhook,
}

/// A Kubernetes-style label selector for choosing a worker agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSelector {
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<MatchExpression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchExpression {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    NotExists,
    Gt,
    Lt,
}

impl Pipeline {
    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Serialize back to a JSON string (parse ∘ serialize round-trip).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Job {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl AgentSelector {
    /// True if the selector has at least one constraint (structural
    /// invariant enforced by the validator, not here).
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }
}
