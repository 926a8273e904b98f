//! Parse/validate/resolve error kinds.

use thiserror::Error;

/// A JSON-pointer-like path to the field that failed, e.g.
/// `jobs[1].steps[0].uses`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, field: &str, i: usize) -> Self {
        if self.0.is_empty() {
            Self(format!("{field}[{i}]"))
        } else {
            Self(format!("{}.{field}[{i}]", self.0))
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}: {message}")]
    Structural { path: FieldPath, message: String },
}

impl ParseError {
    pub fn structural(path: FieldPath, message: impl Into<String>) -> Self {
        Self::Structural {
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: FieldPath,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to resolve expression `{expr}`: {message}")]
pub struct ResolutionError {
    pub expr: String,
    pub message: String,
}
