//! Validation issues: the closed error-code taxonomy, the keyword mapping
//! table, message templates, and translation of raw runtime failures.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::SourceLocation;
use crate::types::ValidationContext;

/// Domain error codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidType,
    InvalidFormat,
    EnumMismatch,
    EnumCaseMismatch,
    AnyOfMissing,
    OneOfMissing,
    OneOfMultiple,
    NotPassed,
    ArrayLengthShort,
    ArrayLengthLong,
    ArrayUnique,
    MultipleOf,
    Minimum,
    MinimumExclusive,
    Maximum,
    MaximumExclusive,
    MinLength,
    MaxLength,
    Pattern,
    ObjectAdditionalProperties,
    ObjectMissingRequiredProperty,
    ObjectPropertiesMinimum,
    ObjectPropertiesMaximum,
    ObjectDependencyKey,
    DiscriminatorValueNotFound,
    ReadonlyPropertyNotAllowedInRequest,
    WriteonlyPropertyNotAllowedInResponse,
    SecretProperty,
    MissingRequiredParameter,
    InvalidResponseBody,
    InvalidResponseHeader,
    InvalidResponseCode,
    InvalidContentType,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::EnumMismatch => "ENUM_MISMATCH",
            ErrorCode::EnumCaseMismatch => "ENUM_CASE_MISMATCH",
            ErrorCode::AnyOfMissing => "ANY_OF_MISSING",
            ErrorCode::OneOfMissing => "ONE_OF_MISSING",
            ErrorCode::OneOfMultiple => "ONE_OF_MULTIPLE",
            ErrorCode::NotPassed => "NOT_PASSED",
            ErrorCode::ArrayLengthShort => "ARRAY_LENGTH_SHORT",
            ErrorCode::ArrayLengthLong => "ARRAY_LENGTH_LONG",
            ErrorCode::ArrayUnique => "ARRAY_UNIQUE",
            ErrorCode::MultipleOf => "MULTIPLE_OF",
            ErrorCode::Minimum => "MINIMUM",
            ErrorCode::MinimumExclusive => "MINIMUM_EXCLUSIVE",
            ErrorCode::Maximum => "MAXIMUM",
            ErrorCode::MaximumExclusive => "MAXIMUM_EXCLUSIVE",
            ErrorCode::MinLength => "MIN_LENGTH",
            ErrorCode::MaxLength => "MAX_LENGTH",
            ErrorCode::Pattern => "PATTERN",
            ErrorCode::ObjectAdditionalProperties => "OBJECT_ADDITIONAL_PROPERTIES",
            ErrorCode::ObjectMissingRequiredProperty => "OBJECT_MISSING_REQUIRED_PROPERTY",
            ErrorCode::ObjectPropertiesMinimum => "OBJECT_PROPERTIES_MINIMUM",
            ErrorCode::ObjectPropertiesMaximum => "OBJECT_PROPERTIES_MAXIMUM",
            ErrorCode::ObjectDependencyKey => "OBJECT_DEPENDENCY_KEY",
            ErrorCode::DiscriminatorValueNotFound => "DISCRIMINATOR_VALUE_NOT_FOUND",
            ErrorCode::ReadonlyPropertyNotAllowedInRequest => {
                "READONLY_PROPERTY_NOT_ALLOWED_IN_REQUEST"
            }
            ErrorCode::WriteonlyPropertyNotAllowedInResponse => {
                "WRITEONLY_PROPERTY_NOT_ALLOWED_IN_RESPONSE"
            }
            ErrorCode::SecretProperty => "SECRET_PROPERTY",
            ErrorCode::MissingRequiredParameter => "MISSING_REQUIRED_PARAMETER",
            ErrorCode::InvalidResponseBody => "INVALID_RESPONSE_BODY",
            ErrorCode::InvalidResponseHeader => "INVALID_RESPONSE_HEADER",
            ErrorCode::InvalidResponseCode => "INVALID_RESPONSE_CODE",
            ErrorCode::InvalidContentType => "INVALID_CONTENT_TYPE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::EnumCaseMismatch | ErrorCode::InvalidContentType => Severity::Error,
            ErrorCode::ObjectDependencyKey => Severity::Warning,
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown error code: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

/// Schema keyword whose check failed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Type,
    Format,
    Enum,
    Pattern,
    Minimum,
    Maximum,
    MinimumExclusive,
    MaximumExclusive,
    MinLength,
    MaxLength,
    MinItems,
    MaxItems,
    UniqueItems,
    MinProperties,
    MaxProperties,
    MultipleOf,
    Required,
    AdditionalProperties,
    Dependencies,
    AnyOf,
    OneOf,
    ReadOnly,
    Mutability,
    Secret,
    DiscriminatorMap,
    /// A delegated keyword with no dedicated code, e.g. a list-valued `type`.
    Other(&'static str),
}

impl Keyword {
    /// Keyword as written in the schema, used for schema paths.
    pub fn name(&self) -> &'static str {
        match self {
            Keyword::Type => "type",
            Keyword::Format => "format",
            Keyword::Enum => "enum",
            Keyword::Pattern => "pattern",
            Keyword::Minimum | Keyword::MinimumExclusive => "minimum",
            Keyword::Maximum | Keyword::MaximumExclusive => "maximum",
            Keyword::MinLength => "minLength",
            Keyword::MaxLength => "maxLength",
            Keyword::MinItems => "minItems",
            Keyword::MaxItems => "maxItems",
            Keyword::UniqueItems => "uniqueItems",
            Keyword::MinProperties => "minProperties",
            Keyword::MaxProperties => "maxProperties",
            Keyword::MultipleOf => "multipleOf",
            Keyword::Required => "required",
            Keyword::AdditionalProperties => "additionalProperties",
            Keyword::Dependencies => "dependencies",
            Keyword::AnyOf => "anyOf",
            Keyword::OneOf => "oneOf",
            Keyword::ReadOnly => "readOnly",
            Keyword::Mutability => crate::types::X_MS_MUTABILITY,
            Keyword::Secret => crate::types::X_MS_SECRET,
            Keyword::DiscriminatorMap => "discriminatorMap",
            Keyword::Other(name) => name,
        }
    }

    /// The keyword mapping table. Unmapped keywords fall back to `NOT_PASSED`.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Keyword::Type => ErrorCode::InvalidType,
            Keyword::Format => ErrorCode::InvalidFormat,
            Keyword::Enum => ErrorCode::EnumMismatch,
            Keyword::Pattern => ErrorCode::Pattern,
            Keyword::Minimum => ErrorCode::Minimum,
            Keyword::Maximum => ErrorCode::Maximum,
            Keyword::MinimumExclusive => ErrorCode::MinimumExclusive,
            Keyword::MaximumExclusive => ErrorCode::MaximumExclusive,
            Keyword::MinLength => ErrorCode::MinLength,
            Keyword::MaxLength => ErrorCode::MaxLength,
            Keyword::MinItems => ErrorCode::ArrayLengthShort,
            Keyword::MaxItems => ErrorCode::ArrayLengthLong,
            Keyword::UniqueItems => ErrorCode::ArrayUnique,
            Keyword::MinProperties => ErrorCode::ObjectPropertiesMinimum,
            Keyword::MaxProperties => ErrorCode::ObjectPropertiesMaximum,
            Keyword::MultipleOf => ErrorCode::MultipleOf,
            Keyword::Required => ErrorCode::ObjectMissingRequiredProperty,
            Keyword::AdditionalProperties => ErrorCode::ObjectAdditionalProperties,
            Keyword::Dependencies => ErrorCode::ObjectDependencyKey,
            Keyword::AnyOf => ErrorCode::AnyOfMissing,
            Keyword::OneOf => ErrorCode::OneOfMissing,
            Keyword::ReadOnly | Keyword::Mutability => ErrorCode::ReadonlyPropertyNotAllowedInRequest,
            Keyword::Secret => ErrorCode::SecretProperty,
            Keyword::DiscriminatorMap => ErrorCode::DiscriminatorValueNotFound,
            Keyword::Other(_) => ErrorCode::NotPassed,
        }
    }
}

/// Values interpolated into a message template.
#[derive(Debug, Clone)]
pub enum Params {
    None,
    Type { expected: String, found: &'static str },
    Data(Value),
    Format { format: String, data: Value },
    Pattern { pattern: String, data: Value },
    MultipleOf { data: Value, multiple_of: Value },
    Limit { actual: Value, limit: Value },
    Property(String),
    Dependency { missing: String, key: String },
    Unique { i: usize, j: usize },
    Access { key: String, value: Value },
}

/// Render `data` the way the message templates expect: strings bare,
/// everything else as JSON.
fn show(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Message template for `code`.
pub fn message(code: ErrorCode, params: &Params) -> String {
    use ErrorCode as C;
    use Params as P;
    match (code, params) {
        (C::InvalidType, P::Type { expected, found }) => {
            format!("Expected type {expected} but found type {found}")
        }
        (C::InvalidFormat, P::Format { format, data }) => {
            format!("Object didn't pass validation for format {format}: {}", show(data))
        }
        (C::Pattern, P::Pattern { pattern, data }) => {
            format!("String does not match pattern {pattern}: {}", show(data))
        }
        (C::MultipleOf, P::MultipleOf { data, multiple_of }) => {
            format!("Value {} is not a multiple of {}", show(data), show(multiple_of))
        }
        (C::EnumCaseMismatch, P::Data(data)) => format!("Enum does not match case for: {}", show(data)),
        (C::EnumMismatch, P::Data(data)) => format!("No enum match for: {}", show(data)),
        (C::MaxLength, P::Limit { actual, limit }) => {
            format!("String is too long ({} chars), maximum {}", show(actual), show(limit))
        }
        (C::MinLength, P::Limit { actual, limit }) => {
            format!("String is too short ({} chars), minimum {}", show(actual), show(limit))
        }
        (C::Minimum, P::Limit { actual, limit }) => {
            format!("Value {} is less than minimum {}", show(actual), show(limit))
        }
        (C::Maximum, P::Limit { actual, limit }) => {
            format!("Value {} is greater than maximum {}", show(actual), show(limit))
        }
        (C::MinimumExclusive, P::Limit { actual, limit }) => format!(
            "Value {} is equal or less than exclusive minimum {}",
            show(actual),
            show(limit)
        ),
        (C::MaximumExclusive, P::Limit { actual, limit }) => format!(
            "Value {} is equal or greater than exclusive maximum {}",
            show(actual),
            show(limit)
        ),
        (C::ArrayLengthLong, P::Limit { actual, limit }) => {
            format!("Array is too long ({}), maximum {}", show(actual), show(limit))
        }
        (C::ArrayLengthShort, P::Limit { actual, limit }) => {
            format!("Array is too short ({}), minimum {}", show(actual), show(limit))
        }
        (C::ObjectPropertiesMaximum, P::Limit { actual, limit }) => {
            format!("Too many properties defined ({}), maximum {}", show(actual), show(limit))
        }
        (C::ObjectPropertiesMinimum, P::Limit { actual, limit }) => {
            format!("Too few properties defined ({}), minimum {}", show(actual), show(limit))
        }
        (C::ArrayUnique, P::Unique { i, j }) => {
            format!("Array items are not unique (indexes {i} and {j})")
        }
        (C::ObjectAdditionalProperties, P::Property(p)) => {
            format!("Additional properties not allowed: {p}")
        }
        (C::ObjectMissingRequiredProperty, P::Property(p)) => {
            format!("Missing required property: {p}")
        }
        (C::ObjectDependencyKey, P::Dependency { missing, key }) => {
            format!("Dependency failed - key must exist: {missing} (due to key: {key})")
        }
        (C::DiscriminatorValueNotFound, P::Data(data)) => {
            format!("Discriminator value \"{}\" not found", show(data))
        }
        (C::ReadonlyPropertyNotAllowedInRequest, P::Access { key, value }) => format!(
            "ReadOnly property `\"{key}\": {}`, cannot be sent in the request.",
            access_value(value)
        ),
        (C::WriteonlyPropertyNotAllowedInResponse, P::Access { key, value }) => format!(
            "Write-only property `\"{key}\": {}`, is not allowed in the response.",
            access_value(value)
        ),
        (C::SecretProperty, P::Access { key, value }) => format!(
            "Secret property `\"{key}\": {}`, cannot be sent in the response.",
            access_value(value)
        ),
        (C::AnyOfMissing, _) => "Data does not match any schemas from 'anyOf'".into(),
        (C::OneOfMissing, _) => "Data does not match any schemas from 'oneOf'".into(),
        (C::OneOfMultiple, _) => "Data is valid against more than one schema from 'oneOf'".into(),
        (C::MissingRequiredParameter, _) => "Value is required but was not provided".into(),
        (C::InvalidResponseBody, _) => "Body is required in response but not provided".into(),
        (C::InvalidResponseCode, P::Data(status)) => format!(
            "This operation does not have a defined '{}' response code",
            show(status)
        ),
        (C::InvalidContentType, P::Format { format, data }) => format!(
            "Invalid Content-Type ({format}).  These are supported: {}",
            show(data)
        ),
        (code, P::Data(data)) => format!("Failed {} validation: {}", code, show(data)),
        (code, _) => format!("Failed {code} validation"),
    }
}

fn access_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(show).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// One reported validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    /// JSON Pointers into the payload; body locations are relative to the body.
    pub paths_in_payload: Vec<String>,
    /// Pointer of the failing keyword inside its document.
    pub schema_path: String,
    pub source: SourceLocation,
}

impl Issue {
    /// Issue not tied to a schema keyword (status code, content type).
    pub fn from_code(code: ErrorCode, params: &Params, url: &str) -> Self {
        Self {
            code,
            message: message(code, params),
            severity: code.severity(),
            paths_in_payload: Vec::new(),
            schema_path: String::new(),
            source: SourceLocation {
                url: url.to_string(),
                json_ref: None,
                position: None,
            },
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.paths_in_payload.join(", ");
        write!(f, "{} {}: {}", self.code, path, self.message)
    }
}

/// A raw runtime failure, before translation.
#[derive(Debug, Clone)]
pub struct Failure {
    pub keyword: Keyword,
    pub code: ErrorCode,
    pub message: String,
    /// Pointer into the validated composite payload.
    pub path: String,
    pub skip: bool,
    pub source: SourceLocation,
}

impl Failure {
    pub fn new(keyword: Keyword, code: ErrorCode, params: &Params, path: String, source: &SourceLocation) -> Self {
        Self {
            keyword,
            code,
            message: message(code, params),
            path,
            skip: false,
            source: source.clone(),
        }
    }
}

/// Translate failures into issues: drop skipped failures, rewrite payload
/// paths and parameter/response codes, apply the include filter, and merge
/// duplicates by unioning their payload paths.
pub fn translate(failures: Vec<Failure>, ctx: &ValidationContext) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::new();
    let mut similar: HashMap<(ErrorCode, String, SourceLocation), usize> = HashMap::new();

    for failure in failures {
        if failure.skip {
            continue;
        }
        // The body itself is the payload root, so `/body` maps to "".
        let in_body = failure.path.starts_with("/body/");
        let payload_path = match failure.path.strip_prefix("/body") {
            Some(rest) if rest.is_empty() || in_body => rest.to_string(),
            _ => failure.path.clone(),
        };

        let mut code = failure.code;
        let mut text = failure.message;
        if !ctx.is_response() && !in_body && failure.keyword == Keyword::Required {
            code = ErrorCode::MissingRequiredParameter;
            text = message(code, &Params::None);
        }
        if ctx.is_response() {
            if failure.path == "/body" {
                code = ErrorCode::InvalidResponseBody;
                text = message(code, &Params::None);
            } else if failure.path.starts_with("/headers") {
                code = ErrorCode::InvalidResponseHeader;
            }
        }
        if !ctx.includes(code) {
            continue;
        }

        let key = (code, text.clone(), failure.source.clone());
        if let Some(&index) = similar.get(&key) {
            let paths = &mut issues[index].paths_in_payload;
            if !paths.contains(&payload_path) {
                paths.push(payload_path);
            }
            continue;
        }
        similar.insert(key, issues.len());
        issues.push(Issue {
            code,
            message: text,
            severity: code.severity(),
            paths_in_payload: vec![payload_path],
            schema_path: format!(
                "{}/{}",
                failure.source.json_ref.as_deref().unwrap_or("#"),
                failure.keyword.name()
            ),
            source: failure.source,
        });
    }
    issues
}
