//! Arena-backed schema graph.
//!
//! Every schema fragment reachable from a specification is stored once in a
//! [`SchemaGraph`] and addressed by [`NodeId`]. Edges carry whether they were
//! written as `$ref`, which decides whether later passes may mutate the target
//! in place or must wrap it.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Stable index of a node in a [`SchemaGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Classification derived from a schema's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Object,
    Array,
    Primitive,
}

impl SchemaKind {
    /// Schemas without a `type` are treated as objects.
    pub fn classify(type_name: Option<&str>) -> Self {
        match type_name {
            None | Some("object") => SchemaKind::Object,
            Some("array") => SchemaKind::Array,
            Some(_) => SchemaKind::Primitive,
        }
    }
}

/// Edge to a subschema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaRef {
    pub target: NodeId,
    /// The edge was written as `$ref`, so the target may be shared.
    pub via_ref: bool,
}

impl SchemaRef {
    pub fn inline(target: NodeId) -> Self {
        Self {
            target,
            via_ref: false,
        }
    }

    pub fn reference(target: NodeId) -> Self {
        Self {
            target,
            via_ref: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(SchemaRef),
}

/// Discriminator tag value → variant. `None` marks the root's own tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscriminatorMap {
    entries: IndexMap<String, Option<NodeId>>,
}

impl DiscriminatorMap {
    pub fn new(root_tag: impl Into<String>) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(root_tag.into(), None);
        Self { entries }
    }

    pub fn insert_variant(&mut self, tag: impl Into<String>, variant: NodeId) {
        self.entries.insert(tag.into(), Some(variant));
    }

    /// `Some(None)` if the tag names the root, `Some(Some(id))` for a variant.
    pub fn get(&self, tag: &str) -> Option<Option<NodeId>> {
        self.entries.get(tag).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<NodeId>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Where a node came from, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub url: String,
    /// JSON Pointer inside `url`, with leading `#`.
    pub json_ref: Option<String>,
    /// Line/column, when the loader tracked them.
    pub position: Option<Position>,
}

impl SourceLocation {
    pub fn new(url: impl Into<String>, pointer: &str) -> Self {
        Self {
            url: url.into(),
            json_ref: Some(format!("#{pointer}")),
            position: None,
        }
    }

    /// `url#/pointer`.
    pub fn location(&self) -> String {
        match &self.json_ref {
            Some(json_ref) => format!("{}{}", self.url, json_ref),
            None => self.url.clone(),
        }
    }
}

/// One schema fragment.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub type_name: Option<String>,
    pub format: Option<String>,
    pub enum_values: Option<Vec<Value>>,
    pub properties: Option<IndexMap<String, SchemaRef>>,
    pub required: Vec<String>,
    pub items: Option<SchemaRef>,
    pub all_of: Option<Vec<SchemaRef>>,
    pub any_of: Option<Vec<SchemaRef>>,
    pub one_of: Option<Vec<SchemaRef>>,
    pub additional_properties: Option<AdditionalProperties>,
    pub discriminator: Option<String>,
    pub discriminator_map: Option<DiscriminatorMap>,
    /// `x-ms-discriminator-value`.
    pub discriminator_value: Option<String>,
    pub nullable: bool,
    /// `x-nullable` as written.
    pub x_nullable: Option<bool>,
    pub read_only: bool,
    pub mutability: Option<Vec<String>>,
    pub secret: bool,
    pub enum_model_as_string: bool,
    /// Failures reported by this node are dropped.
    pub skip_error: bool,
    /// Reference path the node is known by; `None` for anonymous inline schemas.
    pub graph_identity: Option<String>,
    /// Scalar keywords checked by the delegated validator.
    pub constraints: Map<String, Value>,
    pub source: SourceLocation,
}

impl SchemaNode {
    pub fn new(source: SourceLocation) -> Self {
        Self {
            kind: SchemaKind::Object,
            type_name: None,
            format: None,
            enum_values: None,
            properties: None,
            required: Vec::new(),
            items: None,
            all_of: None,
            any_of: None,
            one_of: None,
            additional_properties: None,
            discriminator: None,
            discriminator_map: None,
            discriminator_value: None,
            nullable: false,
            x_nullable: None,
            read_only: false,
            mutability: None,
            secret: false,
            enum_model_as_string: false,
            skip_error: false,
            graph_identity: None,
            constraints: Map::new(),
            source,
        }
    }

    /// `{"type": "null"}` marker used by nullable wrappers.
    pub fn null_marker(source: SourceLocation) -> Self {
        let mut node = Self::new(source);
        node.kind = SchemaKind::Primitive;
        node.type_name = Some("null".into());
        node.skip_error = true;
        node
    }

    /// Last segment of the graph identity, used as a default name.
    pub fn name(&self) -> Option<&str> {
        self.graph_identity
            .as_deref()
            .and_then(|id| id.rsplit('/').next())
            .filter(|name| !name.is_empty() && !name.contains('#'))
    }

    pub fn is_object_typed(&self) -> bool {
        self.type_name.as_deref() == Some("object")
    }

    pub fn has_properties(&self) -> bool {
        self.properties.as_ref().is_some_and(|p| !p.is_empty())
    }
}

/// Schemas classified by kind, in visit order.
#[derive(Debug, Clone, Default)]
pub struct SchemaCollections {
    pub objects: Vec<NodeId>,
    pub arrays: Vec<NodeId>,
    pub primitives: Vec<NodeId>,
}

impl SchemaCollections {
    pub fn push(&mut self, kind: SchemaKind, id: NodeId) {
        match kind {
            SchemaKind::Object => self.objects.push(id),
            SchemaKind::Array => self.arrays.push(id),
            SchemaKind::Primitive => self.primitives.push(id),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len() + self.arrays.len() + self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    nodes: Vec<SchemaNode>,
    locations: HashMap<String, NodeId>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SchemaNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node built for a canonical location (`url#pointer`).
    pub fn lookup(&self, location: &str) -> Option<NodeId> {
        self.locations.get(location).copied()
    }

    pub fn bind(&mut self, location: impl Into<String>, id: NodeId) {
        self.locations.insert(location.into(), id);
    }

    /// Node for `#/definitions/{name}` of the document at `url`.
    pub fn definition(&self, url: &str, name: &str) -> Option<NodeId> {
        let escaped = crate::types::escape_pointer_segment(name);
        self.lookup(&format!("{url}#/definitions/{escaped}"))
    }

    /// Render a node back to JSON Schema. Edges written as `$ref` are emitted
    /// as `{"$ref": location}` instead of being expanded.
    pub fn to_value(&self, id: NodeId) -> Value {
        let mut stack = HashSet::new();
        self.render(id, &mut stack)
    }

    fn render_ref(&self, edge: SchemaRef, stack: &mut HashSet<NodeId>) -> Value {
        if edge.via_ref || stack.contains(&edge.target) {
            let target = self.node(edge.target);
            let location = target
                .graph_identity
                .clone()
                .unwrap_or_else(|| target.source.location());
            return json!({ "$ref": location });
        }
        self.render(edge.target, stack)
    }

    fn render(&self, id: NodeId, stack: &mut HashSet<NodeId>) -> Value {
        stack.insert(id);
        let node = self.node(id);
        let mut out = Map::new();

        if let Some(t) = &node.type_name {
            out.insert("type".into(), json!(t));
        }
        if let Some(f) = &node.format {
            out.insert("format".into(), json!(f));
        }
        if let Some(values) = &node.enum_values {
            out.insert("enum".into(), Value::Array(values.clone()));
        }
        for (k, v) in &node.constraints {
            out.insert(k.clone(), v.clone());
        }
        if let Some(props) = &node.properties {
            let mut rendered = Map::new();
            for (key, edge) in props {
                rendered.insert(key.clone(), self.render_ref(*edge, stack));
            }
            out.insert("properties".into(), Value::Object(rendered));
        }
        if !node.required.is_empty() {
            out.insert("required".into(), json!(node.required));
        }
        if let Some(items) = node.items {
            out.insert("items".into(), self.render_ref(items, stack));
        }
        for (keyword, branches) in [
            ("allOf", &node.all_of),
            ("anyOf", &node.any_of),
            ("oneOf", &node.one_of),
        ] {
            if let Some(branches) = branches {
                let rendered: Vec<Value> =
                    branches.iter().map(|b| self.render_ref(*b, stack)).collect();
                out.insert(keyword.into(), Value::Array(rendered));
            }
        }
        match node.additional_properties {
            Some(AdditionalProperties::Allowed(allowed)) => {
                out.insert("additionalProperties".into(), json!(allowed));
            }
            Some(AdditionalProperties::Schema(edge)) => {
                out.insert("additionalProperties".into(), self.render_ref(edge, stack));
            }
            None => {}
        }
        if let Some(d) = &node.discriminator {
            out.insert("discriminator".into(), json!(d));
        }
        if let Some(map) = &node.discriminator_map {
            let mut rendered = Map::new();
            for (tag, variant) in map.iter() {
                let value = match variant {
                    Some(v) => self.render_ref(SchemaRef::reference(v), stack),
                    None => Value::Null,
                };
                rendered.insert(tag.to_string(), value);
            }
            out.insert("discriminatorMap".into(), Value::Object(rendered));
        }
        if node.nullable {
            out.insert("nullable".into(), json!(true));
        }
        if node.read_only {
            out.insert("readOnly".into(), json!(true));
        }
        if let Some(m) = &node.mutability {
            out.insert(crate::types::X_MS_MUTABILITY.into(), json!(m));
        }
        if node.secret {
            out.insert(crate::types::X_MS_SECRET.into(), json!(true));
        }

        stack.remove(&id);
        Value::Object(out)
    }
}
