//! Document-scoped passes, plus variant discovery which needs every document.

use serde_json::{json, Value};

use crate::builder::GraphBuilder;
use crate::error::CompileError;
use crate::transform::{
    TransformContext, Transformer, TransformerScope, DISCOVER_VARIANTS, DISCRIMINATOR,
    REFERENCE_FIELDS, RESOLVE_NESTED_DEFINITIONS, XMS_PATHS,
};
use crate::types::{DEFAULT_MEDIA_TYPE, HTTP_METHODS, X_MS_PATHS};

/// Merges `x-ms-paths` into `paths`; entries of `x-ms-paths` win.
pub struct XmsPathsTransformer;

impl Transformer for XmsPathsTransformer {
    fn name(&self) -> &'static str {
        XMS_PATHS
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Document
    }

    fn before(&self) -> &'static [&'static str] {
        &[RESOLVE_NESTED_DEFINITIONS]
    }

    fn transform_document(&self, url: &str, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let Some(Value::Object(document)) = ctx.documents.get_mut(url) else {
            return Ok(());
        };
        let Some(Value::Object(extra)) = document.remove(X_MS_PATHS) else {
            return Ok(());
        };
        let paths = document
            .entry("paths")
            .or_insert_with(|| json!({}));
        if let Value::Object(paths) = paths {
            for (template, item) in extra {
                paths.insert(template, item);
            }
        }
        Ok(())
    }
}

/// Defaults `consumes`/`produces` at document and operation level.
pub struct ReferenceFieldsTransformer;

impl Transformer for ReferenceFieldsTransformer {
    fn name(&self) -> &'static str {
        REFERENCE_FIELDS
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Document
    }

    fn after(&self) -> &'static [&'static str] {
        &[XMS_PATHS]
    }

    fn before(&self) -> &'static [&'static str] {
        &[RESOLVE_NESTED_DEFINITIONS]
    }

    fn transform_document(&self, url: &str, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let Some(Value::Object(document)) = ctx.documents.get_mut(url) else {
            return Ok(());
        };
        for key in ["consumes", "produces"] {
            document
                .entry(key)
                .or_insert_with(|| json!([DEFAULT_MEDIA_TYPE]));
        }
        let consumes = document.get("consumes").cloned().unwrap_or_default();
        let produces = document.get("produces").cloned().unwrap_or_default();

        let Some(Value::Object(paths)) = document.get_mut("paths") else {
            return Ok(());
        };
        for item in paths.values_mut() {
            for method in HTTP_METHODS {
                if let Some(Value::Object(operation)) = item.get_mut(*method) {
                    operation
                        .entry("consumes")
                        .or_insert_with(|| consumes.clone());
                    operation
                        .entry("produces")
                        .or_insert_with(|| produces.clone());
                }
            }
        }
        Ok(())
    }
}

/// Builds the schema graph and operation models for each document.
pub struct ResolveNestedDefinitionsTransformer;

impl Transformer for ResolveNestedDefinitionsTransformer {
    fn name(&self) -> &'static str {
        RESOLVE_NESTED_DEFINITIONS
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Document
    }

    fn transform_document(&self, url: &str, ctx: &mut TransformContext) -> Result<(), CompileError> {
        // Referenced documents contribute only what a root reaches.
        if !ctx.documents.is_root(url) {
            return Ok(());
        }
        let mut builder = GraphBuilder::new(
            &ctx.documents,
            &mut ctx.graph,
            &mut ctx.collections,
            &mut ctx.deferred_errors,
        );
        let operations = builder.visit_document(url);
        tracing::debug!(%url, operations = operations.len(), nodes = ctx.graph.len(), "built schema graph");
        ctx.operations.extend(operations);
        Ok(())
    }
}

/// Second builder pass for variants reachable only through a discriminator.
pub struct DiscoverVariantsTransformer;

impl Transformer for DiscoverVariantsTransformer {
    fn name(&self) -> &'static str {
        DISCOVER_VARIANTS
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn before(&self) -> &'static [&'static str] {
        &[DISCRIMINATOR]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let added = GraphBuilder::new(
            &ctx.documents,
            &mut ctx.graph,
            &mut ctx.collections,
            &mut ctx.deferred_errors,
        )
        .discover_variants();
        tracing::debug!(added, "variant discovery finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DocumentSet;

    fn context(document: Value) -> (String, TransformContext) {
        let mut docs = DocumentSet::new();
        let url = docs.insert_root("/specs/api.json", document);
        (url, TransformContext::new(docs))
    }

    #[test]
    fn xms_paths_are_merged_into_paths() {
        let (url, mut ctx) = context(json!({
            "paths": {"/a": {"get": {}}},
            "x-ms-paths": {"/a?op=b": {"post": {}}}
        }));
        XmsPathsTransformer.transform_document(&url, &mut ctx).unwrap();

        let doc = ctx.documents.get(&url).unwrap();
        assert!(doc.get("x-ms-paths").is_none());
        assert!(doc["paths"].get("/a").is_some());
        assert!(doc["paths"].get("/a?op=b").is_some());
    }

    #[test]
    fn reference_fields_default_media_types() {
        let (url, mut ctx) = context(json!({
            "produces": ["application/xml"],
            "paths": {"/a": {
                "get": {},
                "put": {"consumes": ["text/plain"]}
            }}
        }));
        ReferenceFieldsTransformer.transform_document(&url, &mut ctx).unwrap();

        let doc = ctx.documents.get(&url).unwrap();
        assert_eq!(doc["consumes"], json!(["application/json"]));
        assert_eq!(doc["paths"]["/a"]["get"]["produces"], json!(["application/xml"]));
        assert_eq!(doc["paths"]["/a"]["put"]["consumes"], json!(["text/plain"]));
        assert_eq!(doc["paths"]["/a"]["get"]["consumes"], json!(["application/json"]));
    }

    #[test]
    fn referenced_documents_are_not_walked_directly() {
        let mut docs = DocumentSet::new();
        docs.insert_referenced(
            "/specs/common.json",
            json!({"definitions": {"A": {"type": "object"}}}),
        );
        let mut ctx = TransformContext::new(docs);
        ResolveNestedDefinitionsTransformer
            .transform_document("/specs/common.json", &mut ctx)
            .unwrap();
        assert!(ctx.graph.is_empty());
    }
}
