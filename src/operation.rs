//! Operation models and the operation validator assembler.
//!
//! A request is validated as one composite object
//! `{path, query, headers, body, formData}` and a response as
//! `{headers, body}`. Parameter schemas are compiled once into the composite;
//! HTTP string values are coerced before validation.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::graph::{NodeId, SchemaGraph, SchemaRef, SourceLocation};
use crate::issue::Issue;
use crate::loader::split_ref;
use crate::runtime::{CompiledNode, CompiledValidator, Compiler};
use crate::suppression::SuppressionSet;
use crate::types::ValidationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

impl ParameterLocation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }

    /// Slot of the composite request object.
    pub fn slot(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "headers",
            Self::Body => "body",
            Self::FormData => "formData",
        }
    }
}

/// String-to-value conversion for HTTP parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Number,
    Boolean,
}

impl Coercion {
    pub fn for_type(type_name: &str) -> Option<Self> {
        match type_name {
            "number" | "integer" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Convert a string; values that do not parse are kept as they are.
    pub fn apply(&self, raw: &str) -> Value {
        match self {
            Coercion::Number => raw
                .trim()
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(raw.to_string())),
            Coercion::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
        }
    }

    /// Coerce strings, and strings inside arrays.
    pub fn apply_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => *value = self.apply(s),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::String(s) = item {
                        *item = self.apply(s);
                    }
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterModel {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaRef,
    pub allow_empty_value: bool,
    pub coercion: Option<Coercion>,
    /// Carries no constraint worth validating.
    pub trivial: bool,
}

#[derive(Debug, Clone)]
pub struct ResponseModel {
    /// `{operation key}/responses/{status}`.
    pub key: String,
    pub status: String,
    pub schema: Option<SchemaRef>,
    /// Lowercased header name → schema.
    pub headers: IndexMap<String, SchemaRef>,
}

/// One operation of a loaded document.
#[derive(Debug, Clone)]
pub struct OperationModel {
    /// `url#/paths/{template}/{method}`.
    pub key: String,
    pub operation_id: Option<String>,
    pub method: String,
    pub path_template: String,
    pub url: String,
    pub parameters: Vec<ParameterModel>,
    pub responses: IndexMap<String, ResponseModel>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    /// Parameter errors, raised when the request validator is compiled.
    pub errors: Vec<CompileError>,
}

impl OperationModel {
    /// Response for `status`, falling back to `default` for error codes.
    pub fn response(&self, status: &str) -> Option<&ResponseModel> {
        if let Some(response) = self.responses.get(status) {
            return Some(response);
        }
        let is_error = status
            .parse::<u16>()
            .is_ok_and(|code| (400..=599).contains(&code));
        if is_error {
            self.responses.get("default")
        } else {
            None
        }
    }

    fn source(&self) -> SourceLocation {
        let (url, pointer) = split_ref(&self.key);
        SourceLocation::new(url, pointer)
    }
}

/// A live HTTP request, as seen by the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRequest {
    #[serde(default)]
    pub path: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub form_data: Map<String, Value>,
}

/// A live HTTP response, as seen by the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponse {
    pub status_code: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl LiveResponse {
    /// Media type of the body, without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| value.as_str())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Assembly options.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyOptions {
    pub skip_trivial_parameters: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            skip_trivial_parameters: true,
        }
    }
}

/// Compiled validator for one request or response.
#[derive(Debug)]
pub struct OperationValidator {
    key: String,
    validator: CompiledValidator,
    /// Slot → parameter name → coercion.
    coercions: HashMap<&'static str, HashMap<String, Coercion>>,
    /// A non-required body that may be sent as `{}`.
    optional_body: bool,
    has_body_schema: bool,
    media_types: Vec<String>,
    suppressions: Arc<SuppressionSet>,
}

impl OperationValidator {
    /// Operation or response key the validator was built for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `consumes` of a request validator, `produces` of a response validator.
    pub fn media_types(&self) -> &[String] {
        &self.media_types
    }

    pub fn has_body_schema(&self) -> bool {
        self.has_body_schema
    }

    /// Validate a composite payload and drop suppressed issues.
    pub fn validate(&self, ctx: &ValidationContext, payload: &Value) -> Vec<Issue> {
        self.suppressions.apply(self.validator.validate(ctx, payload))
    }

    /// Composite payload for a live request, with coercions applied.
    pub fn request_payload(&self, request: &LiveRequest) -> Value {
        let mut payload = Map::new();
        payload.insert("path".into(), Value::Object(self.coerce("path", request.path.clone())));
        payload.insert("query".into(), Value::Object(self.coerce("query", request.query.clone())));
        payload.insert(
            "headers".into(),
            Value::Object(self.coerce("headers", lowercase_keys(&request.headers))),
        );
        payload.insert("formData".into(), Value::Object(request.form_data.clone()));
        if let Some(body) = &request.body {
            let empty = matches!(body, Value::Object(map) if map.is_empty());
            if !(self.optional_body && (empty || body.is_null())) {
                payload.insert("body".into(), body.clone());
            }
        }
        Value::Object(payload)
    }

    /// Composite payload for a live response, with coercions applied.
    pub fn response_payload(&self, response: &LiveResponse) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "headers".into(),
            Value::Object(self.coerce("headers", lowercase_keys(&response.headers))),
        );
        if let Some(body) = &response.body {
            payload.insert("body".into(), body.clone());
        }
        Value::Object(payload)
    }

    fn coerce(&self, slot: &str, mut values: Map<String, Value>) -> Map<String, Value> {
        if let Some(coercions) = self.coercions.get(slot) {
            for (name, coercion) in coercions {
                if let Some(value) = values.get_mut(name) {
                    coercion.apply_value(value);
                }
            }
        }
        values
    }
}

fn lowercase_keys(headers: &Map<String, Value>) -> Map<String, Value> {
    headers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Builds composite validators over a transformed graph.
pub struct Assembler<'g> {
    graph: &'g SchemaGraph,
    deferred: &'g HashMap<NodeId, CompileError>,
    options: AssemblyOptions,
    suppressions: Arc<SuppressionSet>,
}

impl<'g> Assembler<'g> {
    pub fn new(
        graph: &'g SchemaGraph,
        deferred: &'g HashMap<NodeId, CompileError>,
        options: AssemblyOptions,
        suppressions: Arc<SuppressionSet>,
    ) -> Self {
        Self {
            graph,
            deferred,
            options,
            suppressions,
        }
    }

    pub fn request(&self, operation: &OperationModel) -> Result<OperationValidator, CompileError> {
        if let Some(error) = operation.errors.first() {
            return Err(error.clone());
        }
        let source = operation.source();
        let mut compiler = Compiler::new(self.graph, self.deferred);
        let root = compiler.push(CompiledNode::object(source.clone()));
        let mut slots: IndexMap<&'static str, usize> = IndexMap::new();
        let mut coercions: HashMap<&'static str, HashMap<String, Coercion>> = HashMap::new();
        let mut optional_body = false;
        let mut has_body_schema = false;

        for param in &operation.parameters {
            if param.trivial && self.options.skip_trivial_parameters {
                continue;
            }
            let schema = compiler.compile(param.schema.target)?;

            if param.location == ParameterLocation::Body {
                has_body_schema = true;
                add_property(&mut compiler, root, "body", schema, param.required);
                optional_body = !param.required;
                continue;
            }

            let slot_name = param.location.slot();
            let name = if param.location == ParameterLocation::Header {
                param.name.to_lowercase()
            } else {
                param.name.clone()
            };
            let slot = *slots.entry(slot_name).or_insert_with(|| {
                let slot = compiler.push(CompiledNode::object(source.clone()));
                add_property(&mut compiler, root, slot_name, slot, false);
                slot
            });
            add_property(&mut compiler, slot, &name, schema, param.required);
            if let Some(coercion) = param.coercion {
                if param.location != ParameterLocation::FormData {
                    coercions.entry(slot_name).or_default().insert(name, coercion);
                }
            }
        }

        let validator = compiler.finish(root);
        tracing::debug!(operation = %operation.key, nodes = validator.len(), "compiled request validator");
        Ok(OperationValidator {
            key: operation.key.clone(),
            validator,
            coercions,
            optional_body,
            has_body_schema,
            media_types: operation.consumes.clone(),
            suppressions: Arc::clone(&self.suppressions),
        })
    }

    pub fn response(
        &self,
        operation: &OperationModel,
        response: &ResponseModel,
    ) -> Result<OperationValidator, CompileError> {
        let (url, pointer) = split_ref(&response.key);
        let source = SourceLocation::new(url, pointer);
        let mut compiler = Compiler::new(self.graph, self.deferred);
        let root = compiler.push(CompiledNode::object(source.clone()));
        let mut coercions: HashMap<&'static str, HashMap<String, Coercion>> = HashMap::new();

        let mut has_body_schema = false;
        if let Some(schema) = response.schema {
            has_body_schema = true;
            let body = compiler.compile(schema.target)?;
            let is_file = self.graph.node(schema.target).type_name.as_deref() == Some("file");
            add_property(&mut compiler, root, "body", body, !is_file);
        }

        if !response.headers.is_empty() {
            let headers = compiler.push(CompiledNode::object(source));
            add_property(&mut compiler, root, "headers", headers, false);
            for (name, edge) in &response.headers {
                let schema = compiler.compile(edge.target)?;
                add_property(&mut compiler, headers, name, schema, false);
                let coercion = self
                    .graph
                    .node(edge.target)
                    .type_name
                    .as_deref()
                    .and_then(Coercion::for_type);
                if let Some(coercion) = coercion {
                    coercions.entry("headers").or_default().insert(name.clone(), coercion);
                }
            }
        }

        let validator = compiler.finish(root);
        tracing::debug!(response = %response.key, nodes = validator.len(), "compiled response validator");
        Ok(OperationValidator {
            key: response.key.clone(),
            validator,
            coercions,
            optional_body: false,
            has_body_schema,
            media_types: operation.produces.clone(),
            suppressions: Arc::clone(&self.suppressions),
        })
    }
}

fn add_property(compiler: &mut Compiler<'_>, parent: usize, name: &str, child: usize, required: bool) {
    let node = compiler.node_mut(parent);
    node.properties
        .get_or_insert_with(IndexMap::new)
        .insert(name.to_string(), child);
    if required && !node.required.iter().any(|r| r == name) {
        node.required.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::ErrorCode;
    use crate::transform::test_support::transformed;
    use crate::transform::TransformContext;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "swagger": "2.0",
            "paths": {
                "/pets/{petId}": {
                    "put": {
                        "operationId": "Pets_Update",
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "type": "string"},
                            {"name": "api-version", "in": "query", "required": true, "type": "string"},
                            {"name": "limit", "in": "query", "type": "integer", "maximum": 10},
                            {"name": "X-Dry-Run", "in": "header", "type": "boolean"},
                            {"name": "pet", "in": "body", "schema": {"$ref": "#/definitions/Pet"}}
                        ],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "schema": {"$ref": "#/definitions/Pet"},
                                "headers": {"Retry-After": {"type": "integer"}}
                            },
                            "204": {"description": "no content"},
                            "default": {"description": "error", "schema": {"type": "object", "properties": {"code": {"type": "string"}}}}
                        }
                    }
                }
            },
            "definitions": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {"name": {"type": "string"}, "age": {"type": "integer"}}
                }
            }
        })
    }

    fn assembler(ctx: &TransformContext) -> Assembler<'_> {
        Assembler::new(
            &ctx.graph,
            &ctx.deferred_errors,
            AssemblyOptions::default(),
            Arc::new(SuppressionSet::default()),
        )
    }

    fn codes(issues: &[Issue]) -> Vec<ErrorCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn coercion_parses_numbers_and_booleans() {
        assert_eq!(Coercion::Number.apply("42"), json!(42));
        assert_eq!(Coercion::Number.apply("4.5"), json!(4.5));
        assert_eq!(Coercion::Number.apply("four"), json!("four"));
        assert_eq!(Coercion::Boolean.apply("TRUE"), json!(true));
        assert_eq!(Coercion::Boolean.apply("yes"), json!("yes"));

        let mut list = json!(["1", "2", 3]);
        Coercion::Number.apply_value(&mut list);
        assert_eq!(list, json!([1, 2, 3]));
    }

    #[test]
    fn request_parameters_are_coerced_and_checked() {
        let (_, ctx) = transformed("/specs/pets.json", document());
        let validator = assembler(&ctx).request(&ctx.operations[0]).unwrap();

        let request = LiveRequest {
            query: json!({"api-version": "2024-01-01", "limit": "5"}).as_object().cloned().unwrap(),
            headers: json!({"X-Dry-Run": "true"}).as_object().cloned().unwrap(),
            body: Some(json!({"name": "Rex"})),
            ..LiveRequest::default()
        };
        let payload = validator.request_payload(&request);
        assert_eq!(payload["query"]["limit"], json!(5));
        assert_eq!(payload["headers"]["x-dry-run"], json!(true));
        assert!(validator.validate(&ValidationContext::request(), &payload).is_empty());

        let request = LiveRequest {
            query: json!({"limit": "50"}).as_object().cloned().unwrap(),
            body: Some(json!({"age": "old"})),
            ..LiveRequest::default()
        };
        let issues = validator.validate(&ValidationContext::request(), &validator.request_payload(&request));
        let mut found = codes(&issues);
        found.sort();
        assert_eq!(
            found,
            vec![ErrorCode::InvalidType, ErrorCode::Maximum, ErrorCode::ObjectMissingRequiredProperty]
        );
        let missing = issues.iter().find(|i| i.code == ErrorCode::ObjectMissingRequiredProperty).unwrap();
        assert_eq!(missing.paths_in_payload, vec!["/name"]);
    }

    #[test]
    fn trivial_parameters_are_skipped_by_default() {
        let (_, ctx) = transformed("/specs/pets.json", document());
        let validator = assembler(&ctx).request(&ctx.operations[0]).unwrap();
        let issues = validator.validate(&ValidationContext::request(), &validator.request_payload(&LiveRequest::default()));
        assert!(issues.is_empty(), "{issues:?}");

        let strict = Assembler::new(
            &ctx.graph,
            &ctx.deferred_errors,
            AssemblyOptions { skip_trivial_parameters: false },
            Arc::new(SuppressionSet::default()),
        )
        .request(&ctx.operations[0])
        .unwrap();
        let issues = strict.validate(&ValidationContext::request(), &strict.request_payload(&LiveRequest::default()));
        assert_eq!(codes(&issues), vec![ErrorCode::MissingRequiredParameter]);
        assert_eq!(issues[0].paths_in_payload, vec!["/path/petId", "/query/api-version"]);
    }

    #[test]
    fn optional_body_treats_empty_object_as_absent() {
        let (_, ctx) = transformed("/specs/pets.json", document());
        let validator = assembler(&ctx).request(&ctx.operations[0]).unwrap();
        let request = LiveRequest {
            body: Some(json!({})),
            ..LiveRequest::default()
        };
        let payload = validator.request_payload(&request);
        assert!(payload.get("body").is_none());
    }

    #[test]
    fn response_body_and_headers() {
        let (_, ctx) = transformed("/specs/pets.json", document());
        let op = &ctx.operations[0];
        let validator = assembler(&ctx).response(op, op.response("200").unwrap()).unwrap();
        let ctx200 = ValidationContext::response("200");

        let missing = LiveResponse {
            status_code: "200".into(),
            ..LiveResponse::default()
        };
        let issues = validator.validate(&ctx200, &validator.response_payload(&missing));
        assert_eq!(codes(&issues), vec![ErrorCode::InvalidResponseBody]);

        let bad_header = LiveResponse {
            status_code: "200".into(),
            headers: json!({"Retry-After": "soon"}).as_object().cloned().unwrap(),
            body: Some(json!({"name": "Rex"})),
        };
        let issues = validator.validate(&ctx200, &validator.response_payload(&bad_header));
        assert_eq!(codes(&issues), vec![ErrorCode::InvalidResponseHeader]);
        assert_eq!(issues[0].paths_in_payload, vec!["/headers/retry-after"]);

        let coerced = LiveResponse {
            headers: json!({"Retry-After": "30"}).as_object().cloned().unwrap(),
            ..bad_header
        };
        assert!(validator.validate(&ctx200, &validator.response_payload(&coerced)).is_empty());
    }

    #[test]
    fn error_statuses_fall_back_to_default() {
        let (_, ctx) = transformed("/specs/pets.json", document());
        let op = &ctx.operations[0];
        assert_eq!(op.response("404").unwrap().status, "default");
        assert_eq!(op.response("204").unwrap().status, "204");
        assert!(op.response("302").is_none());
    }

    #[test]
    fn content_type_strips_parameters() {
        let response = LiveResponse {
            status_code: "200".into(),
            headers: json!({"Content-Type": "application/json; charset=utf-8"}).as_object().cloned().unwrap(),
            body: None,
        };
        assert_eq!(response.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn parameter_errors_fail_request_compilation() {
        let mut doc = document();
        doc["paths"]["/pets/{petId}"]["put"]["parameters"]
            .as_array_mut()
            .unwrap()
            .push(json!({"name": "session", "in": "cookie", "type": "string"}));
        let (_, ctx) = transformed("/specs/pets.json", doc);
        let err = assembler(&ctx).request(&ctx.operations[0]).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedParameterLocation { name, .. } if name == "session"));
    }
}
