//! Semantic validation of a decoded pipeline: everything `parse` cannot
//! express as a structural JSON shape.

use std::collections::HashSet;

use pipeline_core::dag::Dag;
use pipeline_core::spec::{AgentSelector, Pipeline, SelectorOperator};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{FieldPath, ValidationError};
use crate::expr;

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+(-[A-Za-z0-9_.-]+)?$").unwrap())
}

fn uses_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+(@\d+\.\d+\.\d+(-[A-Za-z0-9_.-]+)?)?$").unwrap())
}

/// Validate a pipeline that has already passed structural `parse`.
/// Returns every violation found rather than stopping at the first one,
/// so a caller can surface the whole list at once.
pub fn validate(pipeline: &Pipeline) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let root = FieldPath::root();

    if !name_re().is_match(&pipeline.namespace) {
        errors.push(ValidationError::new(
            root.field("namespace"),
            "namespace must match [A-Za-z0-9_-]+",
        ));
    }

    if let Some(version) = &pipeline.version {
        if !version_re().is_match(version) {
            errors.push(ValidationError::new(
                root.field("version"),
                "version must match M.m.p[-tag]",
            ));
        }
    }

    let mut job_names = HashSet::new();
    for (ji, job) in pipeline.jobs.iter().enumerate() {
        let job_path = root.index("jobs", ji);

        if !name_re().is_match(&job.name) {
            errors.push(ValidationError::new(
                job_path.field("name"),
                "job name must match [A-Za-z0-9_-]+",
            ));
        }
        if !job_names.insert(job.name.clone()) {
            errors.push(ValidationError::new(
                job_path.field("name"),
                format!("duplicate job name `{}`", job.name),
            ));
        }

        if let Some(timeout) = &job.timeout {
            if humantime::parse_duration(timeout).is_err() {
                errors.push(ValidationError::new(
                    job_path.field("timeout"),
                    format!("`{timeout}` is not a valid duration (e.g. 30s, 5m, 1h)"),
                ));
            }
        }

        if let Some(retry) = &job.retry {
            if retry.max_attempts == 0 {
                errors.push(ValidationError::new(
                    job_path.field("retry.max_attempts"),
                    "retry.max_attempts must be at least 1",
                ));
            }
            if let Some(delay) = &retry.delay {
                if humantime::parse_duration(delay).is_err() {
                    errors.push(ValidationError::new(
                        job_path.field("retry.delay"),
                        format!("`{delay}` is not a valid duration"),
                    ));
                }
            }
        }

        if let Some(when) = &job.when {
            if let Err(e) = expr::parse(when) {
                errors.push(ValidationError::new(
                    job_path.field("when"),
                    format!("invalid expression `{when}`: {e}"),
                ));
            }
        }

        for dep in &job.depends_on {
            if dep == &job.name {
                errors.push(ValidationError::new(
                    job_path.field("depends_on"),
                    format!("job `{}` cannot depend on itself", job.name),
                ));
            }
        }

        let mut step_names = HashSet::new();
        for (si, step) in job.steps.iter().enumerate() {
            let step_path = job_path.index("steps", si);

            if !name_re().is_match(&step.name) {
                errors.push(ValidationError::new(
                    step_path.field("name"),
                    "step name must match [A-Za-z0-9_-]+",
                ));
            }
            if !step_names.insert(step.name.clone()) {
                errors.push(ValidationError::new(
                    step_path.field("name"),
                    format!("duplicate step name `{}` in job `{}`", step.name, job.name),
                ));
            }

            if !uses_re().is_match(&step.uses) {
                errors.push(ValidationError::new(
                    step_path.field("uses"),
                    format!("`{}` must match name[@M.m.p[-tag]]", step.uses),
                ));
            }

            if let Some(timeout) = &step.timeout {
                if humantime::parse_duration(timeout).is_err() {
                    errors.push(ValidationError::new(
                        step_path.field("timeout"),
                        format!("`{timeout}` is not a valid duration"),
                    ));
                }
            }

            if let Some(when) = &step.when {
                if let Err(e) = expr::parse(when) {
                    errors.push(ValidationError::new(
                        step_path.field("when"),
                        format!("invalid expression `{when}`: {e}"),
                    ));
                }
            }

            if let Some(selector) = &step.agent_selector {
                validate_selector(&step_path.field("agent_selector"), selector, &mut errors);
            }
        }
    }

    validate_dependencies(pipeline, &mut errors);

    errors
}

fn validate_selector(path: &FieldPath, selector: &AgentSelector, errors: &mut Vec<ValidationError>) {
    for (i, expr) in selector.match_expressions.iter().enumerate() {
        let expr_path = path.index("match_expressions", i);
        match expr.operator {
            SelectorOperator::Exists | SelectorOperator::NotExists => {
                if !expr.values.is_empty() {
                    errors.push(ValidationError::new(
                        expr_path.field("values"),
                        "Exists/NotExists must not set values",
                    ));
                }
            }
            SelectorOperator::In | SelectorOperator::NotIn => {
                if expr.values.is_empty() {
                    errors.push(ValidationError::new(
                        expr_path.field("values"),
                        "In/NotIn requires at least one value",
                    ));
                }
            }
            SelectorOperator::Gt | SelectorOperator::Lt => {
                if expr.values.len() != 1 {
                    errors.push(ValidationError::new(
                        expr_path.field("values"),
                        "Gt/Lt requires exactly one value",
                    ));
                } else if expr.values[0].parse::<f64>().is_err() {
                    errors.push(ValidationError::new(
                        expr_path.field("values"),
                        format!("`{}` is not numeric", expr.values[0]),
                    ));
                }
            }
        }
    }
}

fn validate_dependencies(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    match Dag::build(pipeline) {
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(
            FieldPath::root().field("jobs"),
            e.to_string(),
        )),
    }
}
