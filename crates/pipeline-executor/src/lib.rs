//! Executor registry (C9): dispatches a step to the first registered
//! executor whose `can_execute` returns true — the local plugin runtime
//! or a remote agent.

pub mod agent;
pub mod local;
pub mod registry;
pub mod request;

pub use agent::AgentExecutor;
pub use local::LocalPluginExecutor;
pub use registry::{DispatchError, ExecutorRegistry, StepExecutor};
pub use request::{ExecutionRequest, StepOutcome};
