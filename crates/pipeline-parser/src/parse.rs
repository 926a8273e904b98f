//! JSON decoding of the pipeline DSL plus structural invariants.
//!
//! `serde_json` handles the shape; this module enforces the invariants
//! `serde` cannot express on its own (non-empty lists, cross-field
//! requirements like `source.type == git` implying `repo` is set).

use pipeline_core::spec::{ApprovalKind, Pipeline, SourceKind};

use crate::error::{FieldPath, ParseError};

/// Decode a JSON document into the spec model and enforce structural
/// invariants.
pub fn parse(bytes: &[u8]) -> Result<Pipeline, ParseError> {
    let pipeline: Pipeline = serde_json::from_slice(bytes)?;
    check_structure(&pipeline)?;
    Ok(pipeline)
}

fn check_structure(pipeline: &Pipeline) -> Result<(), ParseError> {
    let root = FieldPath::root();

    if pipeline.namespace.trim().is_empty() {
        return Err(ParseError::structural(
            root.field("namespace"),
            "namespace must be present",
        ));
    }

    if pipeline.jobs.is_empty() {
        return Err(ParseError::structural(
            root.field("jobs"),
            "pipeline must declare at least one job",
        ));
    }

    for (ji, job) in pipeline.jobs.iter().enumerate() {
        let job_path = root.index("jobs", ji);

        if job.steps.is_empty() {
            return Err(ParseError::structural(
                job_path.field("steps"),
                "job must declare at least one step",
            ));
        }

        for (si, step) in job.steps.iter().enumerate() {
            let step_path = job_path.index("steps", si);
            if step.uses.trim().is_empty() {
                return Err(ParseError::structural(
                    step_path.field("uses"),
                    "step must set a non-empty `uses`",
                ));
            }
        }

        if let Some(source) = &job.source {
            if source.kind == SourceKind::Git && source.repo.is_none() {
                return Err(ParseError::structural(
                    job_path.field("source.repo"),
                    "source.type == git requires `repo`",
                ));
            }
        }

        if let Some(approval) = &job.approval {
            let _ = approval.kind; // ApprovalKind::{Manual,Auto} already closed by serde
            if approval.required && approval.plugin.is_none() {
                return Err(ParseError::structural(
                    job_path.field("approval.plugin"),
                    "approval.required implies approval.plugin is set",
                ));
            }
        }

        if let Some(notify) = &job.notify {
            for (i, item) in notify.on_success.iter().enumerate() {
                check_notify_item(&job_path.index("notify.on_success", i), item)?;
            }
            for (i, item) in notify.on_failure.iter().enumerate() {
                check_notify_item(&job_path.index("notify.on_failure", i), item)?;
            }
        }
    }

    Ok(())
}

fn check_notify_item(
    path: &FieldPath,
    item: &pipeline_core::spec::NotifyItem,
) -> Result<(), ParseError> {
    if item.plugin.trim().is_empty() {
        return Err(ParseError::structural(
            path.field("plugin"),
            "notify item requires `plugin`",
        ));
    }
    if item.action.trim().is_empty() {
        return Err(ParseError::structural(
            path.field("action"),
            "notify item requires `action`",
        ));
    }
    Ok(())
}

/// Serialize a pipeline back to a JSON string.
pub fn to_json(pipeline: &Pipeline) -> Result<String, ParseError> {
    Ok(pipeline.to_json()?)
}
