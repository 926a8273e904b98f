//! Reconciler and job/step runner (C7, C8): the control loop that
//! drives a pipeline run to completion over the DAG, worker pool, and
//! executor registry.

pub mod job_runner;
pub mod reconciler;
pub mod step_runner;

pub use job_runner::JobRunOutcome;
pub use reconciler::{run, PipelineOutcome};
pub use step_runner::StepRunOutcome;
