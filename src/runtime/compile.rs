use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::CompileError;
use crate::graph::{AdditionalProperties, NodeId, SchemaGraph, SchemaNode};
use crate::runtime::{
    Access, Additional, CompiledNode, CompiledValidator, DelegatedCheck, Dispatch, FormatCheck,
};

/// Compiles graph nodes into a [`CompiledValidator`] arena.
///
/// Each graph node is compiled at most once per validator; its slot is
/// reserved before children are compiled, so recursive schemas terminate.
pub struct Compiler<'g> {
    graph: &'g SchemaGraph,
    deferred: &'g HashMap<NodeId, CompileError>,
    nodes: Vec<CompiledNode>,
    index: HashMap<NodeId, usize>,
}

impl<'g> Compiler<'g> {
    pub fn new(graph: &'g SchemaGraph, deferred: &'g HashMap<NodeId, CompileError>) -> Self {
        Self {
            graph,
            deferred,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a synthetic node, returning its index.
    pub fn push(&mut self, node: CompiledNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn node_mut(&mut self, index: usize) -> &mut CompiledNode {
        &mut self.nodes[index]
    }

    /// Compile `id` and everything reachable from it.
    ///
    /// Fails with the deferred error of the first reachable node that has one.
    pub fn compile(&mut self, id: NodeId) -> Result<usize, CompileError> {
        if let Some(&index) = self.index.get(&id) {
            return Ok(index);
        }
        if let Some(error) = self.deferred.get(&id) {
            return Err(error.clone());
        }

        let graph = self.graph;
        let node = graph.node(id);
        let slot = self.push(CompiledNode::default());
        self.index.insert(id, slot);

        let compiled = self.build(node)?;
        self.nodes[slot] = compiled;
        Ok(slot)
    }

    pub fn finish(self, root: usize) -> CompiledValidator {
        CompiledValidator::new(self.nodes, root)
    }

    fn build(&mut self, node: &SchemaNode) -> Result<CompiledNode, CompileError> {
        let location = node.source.location();

        let properties = match &node.properties {
            Some(props) => {
                let mut compiled = IndexMap::new();
                for (key, edge) in props {
                    compiled.insert(key.clone(), self.compile(edge.target)?);
                }
                Some(compiled)
            }
            None => None,
        };
        let additional = match node.additional_properties {
            Some(AdditionalProperties::Allowed(allowed)) => Some(Additional::Allowed(allowed)),
            Some(AdditionalProperties::Schema(edge)) => Some(Additional::Schema(self.compile(edge.target)?)),
            None => None,
        };
        let items = match node.items {
            Some(edge) => Some(self.compile(edge.target)?),
            None => None,
        };
        let mut branches = |edges: &Option<Vec<crate::graph::SchemaRef>>| -> Result<Vec<usize>, CompileError> {
            edges
                .iter()
                .flatten()
                .map(|edge| self.compile(edge.target))
                .collect()
        };
        let all_of = branches(&node.all_of)?;
        let any_of = branches(&node.any_of)?;
        let one_of = branches(&node.one_of)?;

        let dispatch = match (&node.discriminator, &node.discriminator_map) {
            (Some(property), Some(map)) => {
                let mut variants = IndexMap::new();
                for (tag, variant) in map.iter() {
                    let compiled = match variant {
                        Some(v) => Some(self.compile(v)?),
                        None => None,
                    };
                    variants.insert(tag.to_string(), compiled);
                }
                Some(Dispatch {
                    property: property.clone(),
                    variants,
                })
            }
            _ => None,
        };

        let format = node
            .format
            .as_deref()
            .map(|f| FormatCheck::compile(f, &location))
            .transpose()?;

        Ok(CompiledNode {
            source: node.source.clone(),
            name: node.name().map(str::to_string).or_else(|| last_segment(&location)),
            type_name: node.type_name.clone(),
            nullable: node.nullable,
            enum_values: node.enum_values.clone(),
            enum_model_as_string: node.enum_model_as_string,
            access: access(node, &location)?,
            skip_error: node.skip_error,
            properties,
            required: node.required.clone(),
            additional,
            items,
            all_of,
            any_of,
            one_of,
            unique_items: node.constraints.get("uniqueItems") == Some(&Value::Bool(true)),
            dependencies: dependencies(node),
            format,
            checks: DelegatedCheck::compile_all(&node.constraints, &location)?,
            dispatch,
        })
    }
}

/// Mutability must allow at least one direction.
fn access(node: &SchemaNode, location: &str) -> Result<Access, CompileError> {
    let mut access = Access {
        read_only: node.read_only,
        secret: node.secret,
        ..Access::default()
    };
    if let Some(mutability) = &node.mutability {
        access.has_mutability = true;
        access.valid_in_request = mutability.iter().any(|m| m == "create" || m == "update");
        access.valid_in_response = mutability.iter().any(|m| m == "read");
        if !access.valid_in_request && !access.valid_in_response {
            return Err(CompileError::InvalidMutability {
                location: location.to_string(),
                value: serde_json::to_string(mutability).unwrap_or_default(),
            });
        }
    }
    Ok(access)
}

fn dependencies(node: &SchemaNode) -> Vec<(String, Vec<String>)> {
    let Some(Value::Object(deps)) = node.constraints.get("dependencies") else {
        return Vec::new();
    };
    deps.iter()
        .map(|(key, required)| {
            let required = required
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            (key.clone(), required)
        })
        .collect()
}

fn last_segment(location: &str) -> Option<String> {
    location
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains('#'))
        .map(crate::types::unescape_pointer_segment)
}
