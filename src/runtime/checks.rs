//! Scalar keyword checks.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::CompileError;
use crate::issue::{Keyword, Params};
use crate::types::is_integral;

const RFC1123: &str = r"^(?:(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun), )?[0-3]\d (?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) \d\d(?:\d\d)? (?:[0-2]\d:[0-5]\d(?::[0-5]\d)|23:59:60) (?:[A-Z]{1,3})?(?:[+-]\d\d\d\d)?$";

const DURATION: &str = r"^P([0-9]+(?:[,\.][0-9]+)?Y)?([0-9]+(?:[,\.][0-9]+)?M)?([0-9]+(?:[,\.][0-9]+)?D)?(?:T([0-9]+(?:[,\.][0-9]+)?H)?([0-9]+(?:[,\.][0-9]+)?M)?([0-9]+(?:[,\.][0-9]+)?S)?)?$";

/// Formats accepted without inspection.
const OPAQUE_FORMATS: &[&str] = &["double", "float", "decimal", "byte", "password", "file"];

fn delegate(schema: &Value, location: &str) -> Result<Arc<jsonschema::Validator>, CompileError> {
    jsonschema::draft4::new(schema)
        .map(Arc::new)
        .map_err(|e| CompileError::InvalidSchema {
            location: location.to_string(),
            message: e.to_string(),
        })
}

/// One scalar keyword, checked by a single-keyword draft 4 validator.
#[derive(Clone)]
pub struct DelegatedCheck {
    pub keyword: Keyword,
    limit: Value,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for DelegatedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCheck")
            .field("keyword", &self.keyword)
            .field("limit", &self.limit)
            .finish()
    }
}

impl DelegatedCheck {
    /// Checks for every scalar keyword present in `constraints`.
    pub fn compile_all(constraints: &Map<String, Value>, location: &str) -> Result<Vec<Self>, CompileError> {
        let mut checks = Vec::new();
        let exclusive = |key: &str| constraints.get(key) == Some(&Value::Bool(true));

        for (key, limit) in constraints {
            let (keyword, schema) = match key.as_str() {
                "pattern" => (Keyword::Pattern, json!({ "pattern": limit })),
                "minLength" => (Keyword::MinLength, json!({ "minLength": limit })),
                "maxLength" => (Keyword::MaxLength, json!({ "maxLength": limit })),
                "minimum" if exclusive("exclusiveMinimum") => (
                    Keyword::MinimumExclusive,
                    json!({ "minimum": limit, "exclusiveMinimum": true }),
                ),
                "minimum" => (Keyword::Minimum, json!({ "minimum": limit })),
                "maximum" if exclusive("exclusiveMaximum") => (
                    Keyword::MaximumExclusive,
                    json!({ "maximum": limit, "exclusiveMaximum": true }),
                ),
                "maximum" => (Keyword::Maximum, json!({ "maximum": limit })),
                "multipleOf" => (Keyword::MultipleOf, json!({ "multipleOf": limit })),
                "minItems" => (Keyword::MinItems, json!({ "minItems": limit })),
                "maxItems" => (Keyword::MaxItems, json!({ "maxItems": limit })),
                "minProperties" => (Keyword::MinProperties, json!({ "minProperties": limit })),
                "maxProperties" => (Keyword::MaxProperties, json!({ "maxProperties": limit })),
                "type" => (Keyword::Other("type"), json!({ "type": limit })),
                _ => continue,
            };
            checks.push(Self {
                keyword,
                limit: limit.clone(),
                validator: delegate(&schema, location)?,
            });
        }
        Ok(checks)
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Message parameters for a failure on `instance`.
    pub fn params(&self, instance: &Value) -> Params {
        let limit = self.limit.clone();
        match self.keyword {
            Keyword::Pattern => Params::Pattern {
                pattern: self.limit.as_str().unwrap_or_default().to_string(),
                data: instance.clone(),
            },
            Keyword::MultipleOf => Params::MultipleOf {
                data: instance.clone(),
                multiple_of: limit,
            },
            Keyword::MinLength | Keyword::MaxLength => Params::Limit {
                actual: json!(instance.as_str().map_or(0, |s| s.chars().count())),
                limit,
            },
            Keyword::MinItems | Keyword::MaxItems => Params::Limit {
                actual: json!(instance.as_array().map_or(0, Vec::len)),
                limit,
            },
            Keyword::MinProperties | Keyword::MaxProperties => Params::Limit {
                actual: json!(instance.as_object().map_or(0, Map::len)),
                limit,
            },
            Keyword::Minimum
            | Keyword::Maximum
            | Keyword::MinimumExclusive
            | Keyword::MaximumExclusive => Params::Limit {
                actual: instance.clone(),
                limit,
            },
            _ => Params::Data(instance.clone()),
        }
    }
}

/// A `format` check.
#[derive(Debug, Clone)]
pub enum FormatCheck {
    Int32,
    Int64,
    UnixTime,
    Opaque(String),
    Pattern { name: String, regex: Regex },
    Delegated { name: String, validator: DelegatedFormat },
}

#[derive(Clone)]
pub struct DelegatedFormat(Arc<jsonschema::Validator>);

impl fmt::Debug for DelegatedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DelegatedFormat")
    }
}

impl FormatCheck {
    pub fn compile(format: &str, location: &str) -> Result<Self, CompileError> {
        let pattern = |source: &str| {
            Regex::new(source).map_err(|e| CompileError::InvalidSchema {
                location: location.to_string(),
                message: e.to_string(),
            })
        };
        Ok(match format {
            "int32" => FormatCheck::Int32,
            "int64" => FormatCheck::Int64,
            "unixtime" => FormatCheck::UnixTime,
            "date-time-rfc1123" => FormatCheck::Pattern {
                name: format.to_string(),
                regex: pattern(RFC1123)?,
            },
            "duration" => FormatCheck::Pattern {
                name: format.to_string(),
                regex: pattern(DURATION)?,
            },
            f if OPAQUE_FORMATS.contains(&f) => FormatCheck::Opaque(f.to_string()),
            f => FormatCheck::Delegated {
                name: f.to_string(),
                validator: DelegatedFormat(delegate(&json!({ "format": f }), location)?),
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            FormatCheck::Int32 => "int32",
            FormatCheck::Int64 => "int64",
            FormatCheck::UnixTime => "unixtime",
            FormatCheck::Opaque(name)
            | FormatCheck::Pattern { name, .. }
            | FormatCheck::Delegated { name, .. } => name,
        }
    }

    /// Numeric formats apply to numbers only, string formats to strings only.
    pub fn is_valid(&self, instance: &Value) -> bool {
        match (self, instance) {
            (FormatCheck::Int32, Value::Number(n)) => {
                is_integral(n)
                    && n.as_f64()
                        .is_some_and(|f| f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX))
            }
            (FormatCheck::Int64 | FormatCheck::UnixTime, Value::Number(n)) => is_integral(n),
            (FormatCheck::Pattern { regex, .. }, Value::String(s)) => regex.is_match(s),
            (FormatCheck::Delegated { validator, .. }, _) => validator.0.is_valid(instance),
            _ => true,
        }
    }
}
