//! Plugin registry boundary (§6).
//!
//! The plugin runtime itself is out of scope for the kernel; this module
//! only names the interface the core consumes:
//! `PluginRegistry.Get(name) -> Plugin`,
//! `Plugin.Invoke(action, params, opts) -> result`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Options passed on every plugin invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeOpts {
    pub workspace: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub build_for_agent: bool,
}

/// Duck-typed plugin result, schema-tagged with explicit defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeResult {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    /// Any other fields the plugin chose to return.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl InvokeResult {
    /// A plugin invocation that returned without error and whose result
    /// does not contradict success is considered successful with exit
    /// code 0, per §4.9.
    pub fn is_success(&self) -> bool {
        match self.success {
            Some(s) => s,
            None => self.exit_code.map(|c| c == 0).unwrap_or(true),
        }
    }
}

/// A single plugin: a named unit of work the executor can invoke.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Synchronous from the caller's perspective, per §6.
    async fn invoke(
        &self,
        action: &str,
        params: serde_json::Value,
        opts: InvokeOpts,
    ) -> Result<InvokeResult>;

    /// Whether this plugin can translate itself into a standalone
    /// command list for remote dispatch (used by the agent manager's
    /// `BuildCommands` call, §4.10).
    async fn build_commands(
        &self,
        _params: serde_json::Value,
        _opts: InvokeOpts,
    ) -> Result<Option<Vec<String>>> {
        Ok(None)
    }
}

/// `PluginRegistry.Get(name) -> Plugin`.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn get(&self, name: &str) -> Result<std::sync::Arc<dyn Plugin>>;
}
