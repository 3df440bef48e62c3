//! Nullability injection.

use crate::error::CompileError;
use crate::graph::{AdditionalProperties, NodeId, SchemaGraph, SchemaKind, SchemaNode, SchemaRef};
use crate::operation::ParameterLocation;
use crate::transform::{TransformContext, Transformer, TransformerScope, ALL_OF, NULLABLE};

/// Makes properties accept `null` where the owner allows it.
///
/// Optional properties default to nullable, required ones to not nullable;
/// `x-nullable` overrides either way. A private target is marked in place. A
/// target reached through `$ref` may be shared, so the edge is replaced by an
/// `anyOf` of the original edge and a null marker.
pub struct NullableTransformer;

impl Transformer for NullableTransformer {
    fn name(&self) -> &'static str {
        NULLABLE
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn after(&self) -> &'static [&'static str] {
        &[ALL_OF]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let graph = &mut ctx.graph;

        for id in ctx.collections.objects.clone() {
            let node = graph.node(id);
            let edges: Vec<(String, SchemaRef)> = node
                .properties
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            let required = node.required.clone();

            for (key, edge) in edges {
                let target = graph.node(edge.target);
                let nullable = target.x_nullable.unwrap_or(!required.contains(&key));
                if !nullable {
                    continue;
                }
                if !edge.via_ref || target.x_nullable == Some(true) {
                    graph.node_mut(edge.target).nullable = true;
                } else {
                    let wrapper = wrap_nullable(graph, edge);
                    if let Some(properties) = graph.node_mut(id).properties.as_mut() {
                        properties.insert(key, SchemaRef::inline(wrapper));
                    }
                }
            }

            if let Some(AdditionalProperties::Schema(edge)) = graph.node(id).additional_properties {
                if edge.via_ref {
                    let wrapper = wrap_nullable(graph, edge);
                    graph.node_mut(id).additional_properties =
                        Some(AdditionalProperties::Schema(SchemaRef::inline(wrapper)));
                } else if graph.node(edge.target).x_nullable != Some(false) {
                    graph.node_mut(edge.target).nullable = true;
                }
            }
        }

        for id in ctx.collections.arrays.clone() {
            if let Some(items) = graph.node(id).items {
                if graph.node(items.target).x_nullable == Some(true) {
                    graph.node_mut(items.target).nullable = true;
                }
            }
        }

        for operation in &ctx.operations {
            for param in &operation.parameters {
                if param.location == ParameterLocation::Query && param.allow_empty_value {
                    graph.node_mut(param.schema.target).nullable = true;
                }
            }
        }
        Ok(())
    }
}

/// `{"anyOf": [edge, {"type": "null"}]}`, with errors of the wrapper and the
/// marker suppressed so only the original branch reports.
fn wrap_nullable(graph: &mut SchemaGraph, edge: SchemaRef) -> NodeId {
    let source = graph.node(edge.target).source.clone();
    let marker = graph.add(SchemaNode::null_marker(source.clone()));
    let mut wrapper = SchemaNode::new(source);
    wrapper.kind = SchemaKind::Object;
    wrapper.skip_error = true;
    wrapper.any_of = Some(vec![edge, SchemaRef::inline(marker)]);
    graph.add(wrapper)
}

#[cfg(test)]
mod tests {
    use crate::graph::AdditionalProperties;
    use crate::transform::test_support::transformed;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "paths": {
                "/things": {"get": {
                    "parameters": [
                        {"name": "filter", "in": "query", "type": "string", "allowEmptyValue": true},
                        {"name": "top", "in": "query", "type": "integer"}
                    ],
                    "responses": {"200": {"description": "ok", "schema": {"$ref": "#/definitions/Thing"}}}
                }}
            },
            "definitions": {
                "Shared": {"type": "object", "properties": {"v": {"type": "string"}}},
                "Forced": {"type": "string", "x-nullable": true},
                "Thing": {
                    "type": "object",
                    "required": ["id", "mustRef", "forced"],
                    "properties": {
                        "id": {"type": "string"},
                        "note": {"type": "string"},
                        "never": {"type": "string", "x-nullable": false},
                        "mustRef": {"$ref": "#/definitions/Shared"},
                        "optRef": {"$ref": "#/definitions/Shared"},
                        "forced": {"$ref": "#/definitions/Forced"},
                        "tags": {"type": "array", "items": {"type": "string", "x-nullable": true}}
                    },
                    "additionalProperties": {"$ref": "#/definitions/Shared"}
                }
            }
        })
    }

    #[test]
    fn private_and_shared_targets() {
        let (url, ctx) = transformed("/specs/null.json", document());
        let g = &ctx.graph;
        let thing = g.node(g.definition(&url, "Thing").unwrap());
        let props = thing.properties.as_ref().unwrap();
        let shared = g.definition(&url, "Shared").unwrap();

        assert!(!g.node(props["id"].target).nullable);
        assert!(g.node(props["note"].target).nullable);
        assert!(!g.node(props["never"].target).nullable);

        // Required reference: untouched.
        assert_eq!(props["mustRef"].target, shared);
        // Optional reference: wrapped, shared target untouched.
        let wrapper = g.node(props["optRef"].target);
        assert!(wrapper.skip_error);
        let branches = wrapper.any_of.as_ref().unwrap();
        assert_eq!(branches[0].target, shared);
        assert_eq!(g.node(branches[1].target).type_name.as_deref(), Some("null"));
        assert!(!g.node(shared).nullable);

        // Explicit x-nullable on the target is applied in place even if required.
        assert!(g.node(props["forced"].target).nullable);

        let items = g.node(props["tags"].target).items.unwrap();
        assert!(g.node(items.target).nullable);

        match thing.additional_properties {
            Some(AdditionalProperties::Schema(edge)) => {
                assert!(!edge.via_ref);
                assert!(g.node(edge.target).any_of.is_some());
            }
            other => panic!("unexpected additionalProperties {other:?}"),
        }
    }

    #[test]
    fn allow_empty_query_parameters_are_nullable() {
        let (_, ctx) = transformed("/specs/null.json", document());
        let op = &ctx.operations[0];
        let filter = op.parameters.iter().find(|p| p.name == "filter").unwrap();
        let top = op.parameters.iter().find(|p| p.name == "top").unwrap();
        assert!(ctx.graph.node(filter.schema.target).nullable);
        assert!(!ctx.graph.node(top.schema.target).nullable);
    }
}
