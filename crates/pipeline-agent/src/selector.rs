//! Kubernetes-style label selector matching against agent labels
//! (§4.10, Testable Property 7).

use std::collections::HashMap;

use pipeline_core::spec::{AgentSelector, SelectorOperator};

/// True if `labels` satisfies every clause of `selector`.
pub fn matches(selector: &AgentSelector, labels: &HashMap<String, String>) -> bool {
    for (key, value) in &selector.match_labels {
        if labels.get(key) != Some(value) {
            return false;
        }
    }

    for expr in &selector.match_expressions {
        if !matches_expression(expr, labels) {
            return false;
        }
    }

    true
}

fn matches_expression(
    expr: &pipeline_core::spec::MatchExpression,
    labels: &HashMap<String, String>,
) -> bool {
    match expr.operator {
        SelectorOperator::Exists => labels.contains_key(&expr.key),
        SelectorOperator::NotExists => !labels.contains_key(&expr.key),
        SelectorOperator::In => labels
            .get(&expr.key)
            .map(|v| expr.values.contains(v))
            .unwrap_or(false),
        SelectorOperator::NotIn => labels
            .get(&expr.key)
            .map(|v| !expr.values.contains(v))
            .unwrap_or(false),
        SelectorOperator::Gt => numeric_compare(expr, labels, |a, b| a > b),
        SelectorOperator::Lt => numeric_compare(expr, labels, |a, b| a < b),
    }
}

fn numeric_compare(
    expr: &pipeline_core::spec::MatchExpression,
    labels: &HashMap<String, String>,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    let Some(label_value) = labels.get(&expr.key).and_then(|v| v.parse::<f64>().ok()) else {
        return false;
    };
    let Some(threshold) = expr.values.first().and_then(|v| v.parse::<f64>().ok()) else {
        return false;
    };
    cmp(label_value, threshold)
}
