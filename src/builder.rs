//! Schema graph construction.
//!
//! Walks a document's operations, parameters, responses and definitions,
//! resolving `$ref` and classifying every reachable schema exactly once.
//! A node is bound to its canonical location before its children are
//! visited, so recursive definitions terminate at the second visit.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::graph::{
    AdditionalProperties, NodeId, SchemaCollections, SchemaGraph, SchemaKind, SchemaNode,
    SchemaRef, SourceLocation,
};
use crate::loader::{split_ref, DocumentSet};
use crate::operation::{Coercion, OperationModel, ParameterLocation, ParameterModel, ResponseModel};
use crate::types::{
    escape_pointer_segment, DEFAULT_MEDIA_TYPE, HTTP_METHODS, X_MS_DISCRIMINATOR_VALUE, X_MS_ENUM,
    X_MS_MUTABILITY, X_MS_SECRET, X_NULLABLE,
};

/// Keywords copied verbatim into [`SchemaNode::constraints`].
pub const SCALAR_KEYWORDS: &[&str] = &[
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minProperties",
    "maxProperties",
];

pub struct GraphBuilder<'a> {
    documents: &'a DocumentSet,
    graph: &'a mut SchemaGraph,
    collections: &'a mut SchemaCollections,
    deferred_errors: &'a mut HashMap<NodeId, CompileError>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        documents: &'a DocumentSet,
        graph: &'a mut SchemaGraph,
        collections: &'a mut SchemaCollections,
        deferred_errors: &'a mut HashMap<NodeId, CompileError>,
    ) -> Self {
        Self {
            documents,
            graph,
            collections,
            deferred_errors,
        }
    }

    /// Visit every operation and named definition of the document at `url`.
    pub fn visit_document(&mut self, url: &str) -> Vec<OperationModel> {
        let documents = self.documents;
        let Some(document) = documents.get(url) else {
            return Vec::new();
        };

        let mut operations = Vec::new();
        if let Some(Value::Object(paths)) = document.get("paths") {
            for (template, item) in paths {
                let path_pointer = format!("/paths/{}", escape_pointer_segment(template));
                for method in HTTP_METHODS {
                    if let Some(operation) = item.get(*method) {
                        operations.push(self.visit_operation(
                            url,
                            document,
                            template,
                            &path_pointer,
                            method,
                            item,
                            operation,
                        ));
                    }
                }
            }
        }

        if let Some(Value::Object(definitions)) = document.get("definitions") {
            for (name, definition) in definitions {
                self.definition(url, name, definition);
            }
        }

        operations
    }

    /// Build the named definition `#/definitions/{name}` of `url`.
    pub fn definition(&mut self, url: &str, name: &str, definition: &Value) -> NodeId {
        let pointer = format!("/definitions/{}", escape_pointer_segment(name));
        match ref_of(definition) {
            Some(reference) => self.resolve_reference(url, &pointer, reference),
            None => {
                let location = format!("{url}#{pointer}");
                self.build(url, &pointer, definition, Some(location))
            }
        }
    }

    /// Build definitions of referenced documents that inherit from an already
    /// visited discriminator root. Such variants are reachable only through the
    /// root's discriminator map, so no operation walks them directly.
    ///
    /// Repeats until no new variant is found and returns how many were added.
    pub fn discover_variants(&mut self) -> usize {
        let documents = self.documents;
        let mut total = 0;
        loop {
            let mut added = 0;
            for url in documents.urls() {
                let Some(Value::Object(definitions)) =
                    documents.get(&url).and_then(|d| d.get("definitions"))
                else {
                    continue;
                };
                for (name, definition) in definitions {
                    let location =
                        format!("{url}#/definitions/{}", escape_pointer_segment(name));
                    if self.graph.lookup(&location).is_some() {
                        continue;
                    }
                    if self.inherits_visited_root(&url, definition, &mut HashSet::new()) {
                        tracing::debug!(%location, "discovered discriminator variant");
                        self.definition(&url, name, definition);
                        added += 1;
                    }
                }
            }
            if added == 0 {
                break;
            }
            total += added;
        }
        total
    }

    fn inherits_visited_root(&self, url: &str, raw: &Value, seen: &mut HashSet<String>) -> bool {
        let Some(branches) = raw.get("allOf").and_then(Value::as_array) else {
            return false;
        };
        for branch in branches {
            let Some(reference) = ref_of(branch) else {
                continue;
            };
            let Some((location, target)) = self.documents.resolve_ref(url, reference) else {
                continue;
            };
            if !seen.insert(location.clone()) {
                continue;
            }
            if target.get("discriminator").is_some() && self.graph.lookup(&location).is_some() {
                return true;
            }
            let target_url = split_ref(&location).0.to_string();
            if self.inherits_visited_root(&target_url, target, seen) {
                return true;
            }
        }
        false
    }

    /// Edge for the subschema `value` found at `url#pointer`.
    pub fn edge(&mut self, url: &str, pointer: &str, value: &Value) -> SchemaRef {
        match ref_of(value) {
            Some(reference) => SchemaRef::reference(self.resolve_reference(url, pointer, reference)),
            None => SchemaRef::inline(self.build(url, pointer, value, None)),
        }
    }

    fn resolve_reference(&mut self, url: &str, pointer: &str, reference: &str) -> NodeId {
        let documents = self.documents;
        let mut base = url.to_string();
        let mut current = reference.to_string();
        let mut chain = HashSet::new();

        loop {
            let Some((location, target)) = documents.resolve_ref(&base, &current) else {
                return self.poisoned(url, pointer, reference);
            };
            if let Some(id) = self.graph.lookup(&location) {
                let node = self.graph.node_mut(id);
                if node.graph_identity.is_none() {
                    node.graph_identity = Some(location);
                }
                return id;
            }
            if !chain.insert(location.clone()) {
                return self.poisoned(url, pointer, reference);
            }
            let (target_url, target_pointer) = split_ref(&location);
            if let Some(next) = ref_of(target) {
                base = target_url.to_string();
                current = next.to_string();
                continue;
            }
            let (target_url, target_pointer) = (target_url.to_string(), target_pointer.to_string());
            return self.build(&target_url, &target_pointer, target, Some(location));
        }
    }

    /// Placeholder for a reference that cannot be resolved. The error is
    /// deferred until a validator that reaches this node is compiled.
    fn poisoned(&mut self, url: &str, pointer: &str, reference: &str) -> NodeId {
        let location = format!("{url}#{pointer}");
        if let Some(id) = self.graph.lookup(&location) {
            return id;
        }
        tracing::warn!(%location, reference, "unresolvable reference");
        let id = self.graph.add(SchemaNode::new(SourceLocation::new(url, pointer)));
        self.graph.bind(location.clone(), id);
        self.deferred_errors.insert(
            id,
            CompileError::UnresolvableReference {
                reference: reference.to_string(),
                location,
            },
        );
        id
    }

    fn build(&mut self, url: &str, pointer: &str, value: &Value, identity: Option<String>) -> NodeId {
        let location = format!("{url}#{pointer}");
        if let Some(id) = self.graph.lookup(&location) {
            let node = self.graph.node_mut(id);
            if node.graph_identity.is_none() {
                node.graph_identity = identity;
            }
            return id;
        }

        let mut node = SchemaNode::new(SourceLocation::new(url, pointer));
        node.graph_identity = identity;
        let Value::Object(raw) = value else {
            let id = self.graph.add(node);
            self.graph.bind(location, id);
            return id;
        };

        apply_keywords(&mut node, raw);
        let kind = node.kind;
        let id = self.graph.add(node);
        self.graph.bind(location, id);
        self.collections.push(kind, id);

        if let Some(Value::Object(props)) = raw.get("properties") {
            let mut properties = IndexMap::new();
            for (key, sub) in props {
                let sub_pointer = format!("{pointer}/properties/{}", escape_pointer_segment(key));
                properties.insert(key.clone(), self.edge(url, &sub_pointer, sub));
            }
            self.graph.node_mut(id).properties = Some(properties);
        }

        if let Some(items) = raw.get("items").filter(|v| v.is_object()) {
            let edge = self.edge(url, &format!("{pointer}/items"), items);
            self.graph.node_mut(id).items = Some(edge);
        }

        match raw.get("additionalProperties") {
            Some(Value::Bool(allowed)) => {
                self.graph.node_mut(id).additional_properties =
                    Some(AdditionalProperties::Allowed(*allowed));
            }
            Some(sub @ Value::Object(_)) => {
                let edge = self.edge(url, &format!("{pointer}/additionalProperties"), sub);
                self.graph.node_mut(id).additional_properties =
                    Some(AdditionalProperties::Schema(edge));
            }
            _ => {}
        }

        for keyword in ["allOf", "anyOf", "oneOf"] {
            let Some(branches) = raw.get(keyword).and_then(Value::as_array) else {
                continue;
            };
            let edges: Vec<SchemaRef> = branches
                .iter()
                .enumerate()
                .map(|(i, b)| self.edge(url, &format!("{pointer}/{keyword}/{i}"), b))
                .collect();
            let node = self.graph.node_mut(id);
            match keyword {
                "allOf" => node.all_of = Some(edges),
                "anyOf" => node.any_of = Some(edges),
                _ => node.one_of = Some(edges),
            }
        }

        id
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_operation(
        &mut self,
        url: &str,
        document: &Value,
        template: &str,
        path_pointer: &str,
        method: &str,
        path_item: &Value,
        operation: &Value,
    ) -> OperationModel {
        let op_pointer = format!("{path_pointer}/{method}");
        let key = format!("{url}#{op_pointer}");
        let mut parameters: Vec<ParameterModel> = Vec::new();
        let mut errors = Vec::new();

        let lists = [
            (path_item.get("parameters"), format!("{path_pointer}/parameters")),
            (operation.get("parameters"), format!("{op_pointer}/parameters")),
        ];
        for (list, base_pointer) in lists {
            let Some(list) = list.and_then(Value::as_array) else {
                continue;
            };
            for (i, raw) in list.iter().enumerate() {
                match self.parameter(url, &format!("{base_pointer}/{i}"), raw) {
                    Ok(param) => {
                        // Operation-level parameters override path-level ones.
                        match parameters
                            .iter_mut()
                            .find(|p| p.name == param.name && p.location == param.location)
                        {
                            Some(existing) => *existing = param,
                            None => parameters.push(param),
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        }

        let mut responses = IndexMap::new();
        if let Some(Value::Object(raw_responses)) = operation.get("responses") {
            for (status, raw) in raw_responses {
                let pointer = format!("{op_pointer}/responses/{}", escape_pointer_segment(status));
                responses.insert(status.clone(), self.response(url, &pointer, &key, status, raw));
            }
        }

        OperationModel {
            key,
            operation_id: operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            method: method.to_string(),
            path_template: template.to_string(),
            url: url.to_string(),
            parameters,
            responses,
            consumes: media_types(operation, document, "consumes"),
            produces: media_types(operation, document, "produces"),
            errors,
        }
    }

    fn parameter(&mut self, url: &str, pointer: &str, raw: &Value) -> Result<ParameterModel, CompileError> {
        let documents = self.documents;
        let (param_url, param_pointer, param, via_ref) = match ref_of(raw) {
            Some(reference) => {
                let (location, target) = documents.resolve_ref(url, reference).ok_or_else(|| {
                    CompileError::UnresolvableReference {
                        reference: reference.to_string(),
                        location: format!("{url}#{pointer}"),
                    }
                })?;
                let (u, p) = split_ref(&location);
                (u.to_string(), p.to_string(), target, true)
            }
            None => (url.to_string(), pointer.to_string(), raw, false),
        };

        let location_of = || format!("{param_url}#{param_pointer}");
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::InvalidSchema {
                location: location_of(),
                message: "parameter has no name".into(),
            })?
            .to_string();
        let raw_in = param.get("in").and_then(Value::as_str).unwrap_or_default();
        let location =
            ParameterLocation::parse(raw_in).ok_or_else(|| CompileError::UnsupportedParameterLocation {
                name: name.clone(),
                location: raw_in.to_string(),
            })?;

        let schema = if location == ParameterLocation::Body {
            let schema_pointer = format!("{param_pointer}/schema");
            match param.get("schema") {
                Some(schema) => self.edge(&param_url, &schema_pointer, schema),
                None => SchemaRef::inline(self.build(&param_url, &schema_pointer, &Value::Null, None)),
            }
        } else {
            let id = self.build(&param_url, &param_pointer, param, None);
            SchemaRef { target: id, via_ref }
        };

        let type_name = param.get("type").and_then(Value::as_str);
        Ok(ParameterModel {
            required: location == ParameterLocation::Path
                || param.get("required").and_then(Value::as_bool).unwrap_or(false),
            allow_empty_value: location == ParameterLocation::Query
                && param
                    .get("allowEmptyValue")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            coercion: type_name.and_then(Coercion::for_type),
            trivial: is_trivial_parameter(param, location, &name),
            name,
            location,
            schema,
        })
    }

    fn response(&mut self, url: &str, pointer: &str, operation_key: &str, status: &str, raw: &Value) -> ResponseModel {
        let documents = self.documents;
        let (response_url, response_pointer, response) = match ref_of(raw) {
            Some(reference) => match documents.resolve_ref(url, reference) {
                Some((location, target)) => {
                    let (u, p) = split_ref(&location);
                    (u.to_string(), p.to_string(), target)
                }
                None => {
                    let poisoned = self.poisoned(url, pointer, reference);
                    return ResponseModel {
                        key: format!("{operation_key}/responses/{status}"),
                        status: status.to_string(),
                        schema: Some(SchemaRef::reference(poisoned)),
                        headers: IndexMap::new(),
                    };
                }
            },
            None => (url.to_string(), pointer.to_string(), raw),
        };

        let schema = response
            .get("schema")
            .map(|s| self.edge(&response_url, &format!("{response_pointer}/schema"), s));

        let mut headers = IndexMap::new();
        if let Some(Value::Object(raw_headers)) = response.get("headers") {
            for (name, header) in raw_headers {
                let header_pointer =
                    format!("{response_pointer}/headers/{}", escape_pointer_segment(name));
                headers.insert(
                    name.to_lowercase(),
                    self.edge(&response_url, &header_pointer, header),
                );
            }
        }

        ResponseModel {
            key: format!("{operation_key}/responses/{status}"),
            status: status.to_string(),
            schema,
            headers,
        }
    }
}

fn ref_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

fn media_types(operation: &Value, document: &Value, key: &str) -> Vec<String> {
    let declared = operation
        .get(key)
        .or_else(|| document.get(key))
        .and_then(Value::as_array);
    match declared {
        Some(list) => list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => vec![DEFAULT_MEDIA_TYPE.to_string()],
    }
}

/// Copy scalar keywords and flags from a raw schema object.
fn apply_keywords(node: &mut SchemaNode, raw: &Map<String, Value>) {
    match raw.get("type") {
        Some(Value::String(t)) => node.type_name = Some(t.clone()),
        Some(types @ Value::Array(_)) => {
            node.constraints.insert("type".into(), types.clone());
        }
        _ => {}
    }
    node.kind = SchemaKind::classify(node.type_name.as_deref());
    node.format = raw.get("format").and_then(Value::as_str).map(str::to_string);
    node.enum_values = raw.get("enum").and_then(Value::as_array).cloned();
    node.required = raw
        .get("required")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    node.discriminator = raw
        .get("discriminator")
        .and_then(Value::as_str)
        .map(str::to_string);
    node.discriminator_value = raw
        .get(X_MS_DISCRIMINATOR_VALUE)
        .and_then(Value::as_str)
        .map(str::to_string);
    node.x_nullable = raw.get(X_NULLABLE).and_then(Value::as_bool);
    node.read_only = raw.get("readOnly").and_then(Value::as_bool).unwrap_or(false);
    node.mutability = raw.get(X_MS_MUTABILITY).and_then(Value::as_array).map(|list| {
        list.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    });
    node.secret = raw.get(X_MS_SECRET).and_then(Value::as_bool).unwrap_or(false);
    node.enum_model_as_string = raw
        .get(X_MS_ENUM)
        .and_then(|e| e.get("modelAsString"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    for keyword in SCALAR_KEYWORDS {
        if let Some(v) = raw.get(*keyword) {
            node.constraints.insert((*keyword).to_string(), v.clone());
        }
    }
    // Only property dependencies; schema dependencies would need their own nodes.
    if let Some(Value::Object(deps)) = raw.get("dependencies") {
        let property_deps: Map<String, Value> = deps
            .iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !property_deps.is_empty() {
            node.constraints
                .insert("dependencies".into(), Value::Object(property_deps));
        }
    }
}

/// A plain string path parameter, or a plain string `api-version` query
/// parameter, carries no constraint worth validating.
fn is_trivial_parameter(param: &Value, location: ParameterLocation, name: &str) -> bool {
    let expected_in = match location {
        ParameterLocation::Path => "path",
        ParameterLocation::Query if name == "api-version" => "query",
        _ => return false,
    };
    let Some(fields) = param.as_object() else {
        return false;
    };
    fields.iter().all(|(key, value)| match key.as_str() {
        "name" | "description" | "required" => true,
        "in" => value == expected_in,
        "type" => value == "string",
        _ => false,
    })
}
