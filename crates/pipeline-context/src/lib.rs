//! Per-run execution context, its status state machine, a pooled
//! lifecycle cache, and the workspace filesystem manager.

pub mod context;
pub mod pool;
pub mod status;
pub mod workspace;

pub use context::{Collaborators, Cursor, ExecutionContext, Middleware};
pub use pool::{ContextPool, SpillStrategy};
pub use status::{InvalidTransition, PipelineStatus, StatusMachine, TransitionRecord};
pub use workspace::WorkspaceManager;
