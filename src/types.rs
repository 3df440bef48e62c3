//! Core types shared by the pipeline and the validator runtime.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::issue::ErrorCode;

/// HTTP methods that may appear as keys of a Swagger path item.
pub const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch"];

/// Swagger vendor extensions consumed by the pipeline.
pub const X_MS_DISCRIMINATOR_VALUE: &str = "x-ms-discriminator-value";
pub const X_NULLABLE: &str = "x-nullable";
pub const X_MS_MUTABILITY: &str = "x-ms-mutability";
pub const X_MS_SECRET: &str = "x-ms-secret";
pub const X_MS_ENUM: &str = "x-ms-enum";
pub const X_MS_PATHS: &str = "x-ms-paths";

/// Media type assumed when a document declares no `consumes`/`produces`.
pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Like [`json_type_name`], but integral numbers report as `integer`.
pub fn instance_type_name(value: &Value) -> &'static str {
    match value {
        Value::Number(n) if is_integral(n) => "integer",
        other => json_type_name(other),
    }
}

pub(crate) fn is_integral(n: &serde_json::Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// Direction of the payload being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn is_response(&self) -> bool {
        matches!(self, Direction::Response)
    }
}

/// Per-call validation context.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub direction: Direction,
    /// Status code of the response being validated, if any.
    pub status_code: Option<String>,
    /// When set, only issues with these codes are reported.
    pub include_errors: Option<HashSet<ErrorCode>>,
}

impl ValidationContext {
    pub fn request() -> Self {
        Self {
            direction: Direction::Request,
            status_code: None,
            include_errors: None,
        }
    }

    pub fn response(status_code: impl Into<String>) -> Self {
        Self {
            direction: Direction::Response,
            status_code: Some(status_code.into()),
            include_errors: None,
        }
    }

    /// Restrict reported issues to the given codes.
    pub fn include_errors(mut self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.include_errors = Some(codes.into_iter().collect());
        self
    }

    pub fn is_response(&self) -> bool {
        self.direction.is_response()
    }

    pub(crate) fn includes(&self, code: ErrorCode) -> bool {
        self.include_errors
            .as_ref()
            .map_or(true, |set| set.contains(&code))
    }
}

/// Escape a key for use as a JSON Pointer segment (`~` → `~0`, `/` → `~1`).
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape_pointer_segment`].
pub fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
