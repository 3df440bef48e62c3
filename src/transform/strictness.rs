//! Property-closure passes.

use crate::error::CompileError;
use crate::graph::AdditionalProperties;
use crate::transform::{
    TransformContext, Transformer, TransformerScope, ALL_OF, NO_ADDITIONAL_PROPERTIES, NULLABLE,
    PURE_OBJECT,
};

/// Closes object schemas that declare properties but say nothing about
/// `additionalProperties`. Discriminator roots and base schemas stay open,
/// since their concrete shape is only known per variant.
pub struct NoAdditionalPropertiesTransformer;

impl Transformer for NoAdditionalPropertiesTransformer {
    fn name(&self) -> &'static str {
        NO_ADDITIONAL_PROPERTIES
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn after(&self) -> &'static [&'static str] {
        &[ALL_OF]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        for id in ctx.collections.objects.clone() {
            let is_base = ctx.is_base_schema(id);
            let node = ctx.graph.node_mut(id);
            if node.additional_properties.is_none()
                && node.discriminator_map.is_none()
                && !is_base
                && node.has_properties()
            {
                node.additional_properties = Some(AdditionalProperties::Allowed(false));
            }
        }
        Ok(())
    }
}

/// Drops `type: object` from schemas with no properties and no
/// `additionalProperties`, so free-form values of any JSON type pass.
pub struct PureObjectTransformer;

impl Transformer for PureObjectTransformer {
    fn name(&self) -> &'static str {
        PURE_OBJECT
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn after(&self) -> &'static [&'static str] {
        &[NO_ADDITIONAL_PROPERTIES, NULLABLE]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        for id in ctx.collections.objects.clone() {
            let node = ctx.graph.node_mut(id);
            if node.is_object_typed()
                && !node.has_properties()
                && node.additional_properties.is_none()
            {
                node.type_name = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::AdditionalProperties;
    use crate::transform::test_support::transformed;
    use serde_json::json;

    #[test]
    fn closes_plain_objects_only() {
        let (url, ctx) = transformed(
            "/specs/strict.json",
            json!({
                "definitions": {
                    "Closed": {"type": "object", "properties": {"a": {"type": "string"}}},
                    "Open": {"type": "object", "additionalProperties": true, "properties": {"a": {"type": "string"}}},
                    "Empty": {"type": "object"},
                    "Root": {"type": "object", "discriminator": "kind", "properties": {"kind": {"type": "string"}}},
                    "Leaf": {"allOf": [{"$ref": "#/definitions/Root"}]},
                    "Box": {
                        "type": "object",
                        "properties": {
                            "toy": {"type": "object", "discriminator": "kind", "properties": {"kind": {"type": "string"}}}
                        }
                    }
                }
            }),
        );
        let g = &ctx.graph;
        let additional = |name: &str| g.node(g.definition(&url, name).unwrap()).additional_properties;

        assert_eq!(additional("Closed"), Some(AdditionalProperties::Allowed(false)));
        assert_eq!(additional("Open"), Some(AdditionalProperties::Allowed(true)));
        assert_eq!(additional("Empty"), None);
        assert_eq!(additional("Root"), None);
        assert_eq!(additional("Leaf"), Some(AdditionalProperties::Allowed(false)));

        // An anonymous discriminator schema gets no map, so it is closed statically.
        let boxed = g.node(g.definition(&url, "Box").unwrap());
        let toy = boxed.properties.as_ref().unwrap()["toy"].target;
        assert_eq!(g.node(toy).additional_properties, Some(AdditionalProperties::Allowed(false)));
    }

    #[test]
    fn pure_object_loses_its_type() {
        let (url, ctx) = transformed(
            "/specs/pure.json",
            json!({
                "definitions": {
                    "Anything": {"type": "object"},
                    "Map": {"type": "object", "additionalProperties": {"type": "string"}},
                    "Shaped": {"type": "object", "properties": {"a": {"type": "string"}}}
                }
            }),
        );
        let g = &ctx.graph;
        let type_of = |name: &str| g.node(g.definition(&url, name).unwrap()).type_name.clone();

        assert_eq!(type_of("Anything"), None);
        assert_eq!(type_of("Map").as_deref(), Some("object"));
        assert_eq!(type_of("Shaped").as_deref(), Some("object"));
    }
}
