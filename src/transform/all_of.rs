//! Flattening of `allOf` inheritance into the owning schema.

use std::collections::{BTreeSet, HashSet};

use crate::error::CompileError;
use crate::graph::{NodeId, SchemaGraph};
use crate::transform::{
    TransformContext, Transformer, TransformerScope, ALL_OF, NO_ADDITIONAL_PROPERTIES, NULLABLE,
};

pub struct AllOfTransformer;

impl Transformer for AllOfTransformer {
    fn name(&self) -> &'static str {
        ALL_OF
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn before(&self) -> &'static [&'static str] {
        &[NO_ADDITIONAL_PROPERTIES, NULLABLE]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let mut visited = HashSet::new();
        for id in ctx.collections.objects.clone() {
            if ctx.graph.node(id).all_of.is_some() {
                merge(&mut ctx.graph, &ctx.base_schemas, id, &mut visited);
            }
        }
        Ok(())
    }
}

/// Merge `properties` and `required` of every branch into `id`, depth first.
///
/// Properties already present win over inherited ones, and branches are
/// applied in declaration order. `additionalProperties` of branches is not
/// inherited. The `allOf` edge is kept only on base schemas without their own
/// discriminator, which still route validation to the root's dispatch.
fn merge(
    graph: &mut SchemaGraph,
    base_schemas: &BTreeSet<NodeId>,
    id: NodeId,
    visited: &mut HashSet<NodeId>,
) {
    let node = graph.node(id);
    if node.type_name.as_deref().is_some_and(|t| t != "object") {
        return;
    }
    let Some(branches) = node.all_of.clone() else {
        return;
    };
    if !visited.insert(id) {
        return;
    }

    graph.node_mut(id).properties.get_or_insert_with(Default::default);
    for branch in branches {
        merge(graph, base_schemas, branch.target, visited);

        let parent = graph.node(branch.target);
        let inherited: Vec<_> = parent
            .properties
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let inherited_required = parent.required.clone();

        let node = graph.node_mut(id);
        if let Some(properties) = node.properties.as_mut() {
            for (key, edge) in inherited {
                properties.entry(key).or_insert(edge);
            }
        }
        for key in inherited_required {
            if !node.required.contains(&key) {
                node.required.push(key);
            }
        }
    }

    let node = graph.node_mut(id);
    if !base_schemas.contains(&id) || node.discriminator.is_some() {
        node.all_of = None;
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::AdditionalProperties;
    use crate::transform::test_support::transformed;
    use serde_json::json;

    #[test]
    fn inherited_properties_are_merged() {
        let (url, ctx) = transformed(
            "/specs/inherit.json",
            json!({
                "definitions": {
                    "Base": {
                        "type": "object",
                        "required": ["id"],
                        "additionalProperties": {"type": "string"},
                        "properties": {"id": {"type": "string"}, "label": {"type": "string"}}
                    },
                    "Derived": {
                        "type": "object",
                        "required": ["size"],
                        "allOf": [{"$ref": "#/definitions/Base"}],
                        "properties": {"label": {"type": "integer"}, "size": {"type": "integer"}}
                    }
                }
            }),
        );
        let g = &ctx.graph;
        let derived = g.node(g.definition(&url, "Derived").unwrap());

        let keys: Vec<&str> = derived.properties.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["label", "size", "id"]);
        let label = derived.properties.as_ref().unwrap()["label"];
        assert_eq!(g.node(label.target).type_name.as_deref(), Some("integer"));
        assert_eq!(derived.required, vec!["size", "id"]);
        assert!(derived.all_of.is_none());
        // Branch additionalProperties is not inherited; the strictness pass closes it.
        assert_eq!(derived.additional_properties, Some(AdditionalProperties::Allowed(false)));
    }

    #[test]
    fn nested_chains_flatten_depth_first() {
        let (url, ctx) = transformed(
            "/specs/chain.json",
            json!({
                "definitions": {
                    "A": {"properties": {"a": {"type": "string"}}},
                    "B": {"allOf": [{"$ref": "#/definitions/A"}], "properties": {"b": {"type": "string"}}},
                    "C": {"allOf": [{"$ref": "#/definitions/B"}], "properties": {"c": {"type": "string"}}}
                }
            }),
        );
        let c = ctx.graph.node(ctx.graph.definition(&url, "C").unwrap());
        let keys: Vec<&str> = c.properties.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[test]
    fn intermediate_base_keeps_all_of() {
        let (url, ctx) = transformed(
            "/specs/pets.json",
            json!({
                "definitions": {
                    "Pet": {"type": "object", "discriminator": "petType", "properties": {"petType": {"type": "string"}}},
                    "Cat": {"allOf": [{"$ref": "#/definitions/Pet"}], "properties": {"indoor": {"type": "boolean"}}},
                    "Kitten": {"allOf": [{"$ref": "#/definitions/Cat"}]}
                }
            }),
        );
        let g = &ctx.graph;
        assert!(g.node(g.definition(&url, "Cat").unwrap()).all_of.is_some());
        assert!(g.node(g.definition(&url, "Kitten").unwrap()).all_of.is_none());
    }

    #[test]
    fn non_object_schemas_are_left_alone() {
        let (url, ctx) = transformed(
            "/specs/prim.json",
            json!({
                "definitions": {
                    "Name": {"type": "string", "allOf": [{"$ref": "#/definitions/Base"}]},
                    "Base": {"type": "string", "minLength": 1}
                }
            }),
        );
        let name = ctx.graph.node(ctx.graph.definition(&url, "Name").unwrap());
        assert!(name.all_of.is_some());
        assert!(name.properties.is_none());
    }
}
