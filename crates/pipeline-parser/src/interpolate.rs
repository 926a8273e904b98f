//! `${{ expr }}` interpolation over JSON values.
//!
//! A field whose entire value is a single `${{ expr }}` expression is
//! replaced by the expression's typed result (so `${{ job.retries }}`
//! can yield a number, not the string `"3"`). Anywhere else in a string
//! an expression is found, it's rendered to its natural string form and
//! spliced in, so `"build-${{ env.BRANCH }}"` becomes `"build-main"`.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ResolutionError;
use crate::expr::{self, Environment, Value};

fn expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{\s*(.*?)\s*\}\}").unwrap())
}

/// Resolve every `${{ }}` occurrence in a string value.
pub fn interpolate_str(input: &str, env: &dyn Environment) -> Result<Value, ResolutionError> {
    let re = expr_re();

    // A string that is nothing but one expression resolves to that
    // expression's typed value rather than a stringified one.
    if let Some(caps) = re.captures(input) {
        if caps.get(0).unwrap().as_str() == input {
            let src = caps.get(1).unwrap().as_str();
            return resolve(src, env);
        }
    }

    let mut err = None;
    let rendered = re.replace_all(input, |caps: &regex::Captures| {
        let src = caps.get(1).unwrap().as_str();
        match resolve(src, env) {
            Ok(v) => v.to_natural_string(),
            Err(e) => {
                err.get_or_insert(e);
                String::new()
            }
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(Value::Str(rendered.into_owned()))
}

fn resolve(src: &str, env: &dyn Environment) -> Result<Value, ResolutionError> {
    expr::eval(src, env).map_err(|e| ResolutionError {
        expr: src.to_string(),
        message: e.to_string(),
    })
}

/// Recursively walk a `serde_json::Value`, resolving `${{ }}` in every
/// string leaf. Object keys and non-string leaves pass through
/// unchanged.
pub fn interpolate_json(
    value: &serde_json::Value,
    env: &dyn Environment,
) -> Result<serde_json::Value, ResolutionError> {
    match value {
        serde_json::Value::String(s) => Ok(value_to_json(interpolate_str(s, env)?)),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate_json(item, env)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), interpolate_json(v, env)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Number(n) => serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s),
    }
}
