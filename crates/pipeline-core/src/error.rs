//! Cross-cutting error kinds shared across the kernel.
//!
//! Component-specific errors (parse, validation, resolution) live closer
//! to their component; this enum covers the kinds that cross crate
//! boundaries once a pipeline is already running.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin invocation failed: {0}")]
    PluginInvocationError(String),

    #[error("no available agents")]
    AgentUnavailable,

    #[error("agent selection failed: {0}")]
    AgentSelectionError(String),

    #[error("task service error: {0}")]
    TaskServiceError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("approval rejected: {0}")]
    ApprovalRejected(String),

    #[error("approval expired")]
    ApprovalExpired,

    #[error("aborted")]
    Aborted,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
