//! Ordered rewrite passes over loaded documents and the schema graph.
//!
//! A [`Transformer`] is either document-scoped (run once per loaded document,
//! before cross-document identities are known) or global (run once over the
//! unified graph). Ordering comes from `before`/`after` declarations, resolved
//! by [`scheduler::schedule`].

mod all_of;
mod discriminator;
mod documents;
mod nullable;
pub mod scheduler;
mod strictness;

use std::collections::{BTreeSet, HashMap};

use crate::error::CompileError;
use crate::graph::{NodeId, SchemaCollections, SchemaGraph};
use crate::loader::DocumentSet;
use crate::operation::OperationModel;

pub use all_of::AllOfTransformer;
pub use discriminator::DiscriminatorTransformer;
pub use documents::{
    DiscoverVariantsTransformer, ReferenceFieldsTransformer, ResolveNestedDefinitionsTransformer,
    XmsPathsTransformer,
};
pub use nullable::NullableTransformer;
pub use scheduler::{schedule, Schedule};
pub use strictness::{NoAdditionalPropertiesTransformer, PureObjectTransformer};

pub const XMS_PATHS: &str = "x-ms-paths";
pub const REFERENCE_FIELDS: &str = "reference-fields";
pub const RESOLVE_NESTED_DEFINITIONS: &str = "resolve-nested-definitions";
pub const DISCOVER_VARIANTS: &str = "discover-variants";
pub const DISCRIMINATOR: &str = "discriminator";
pub const ALL_OF: &str = "all-of";
pub const NO_ADDITIONAL_PROPERTIES: &str = "no-additional-properties";
pub const NULLABLE: &str = "nullable";
pub const PURE_OBJECT: &str = "pure-object";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerScope {
    Document,
    Global,
}

impl std::fmt::Display for TransformerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformerScope::Document => write!(f, "document"),
            TransformerScope::Global => write!(f, "global"),
        }
    }
}

/// A named rewrite pass.
///
/// `before` and `after` name other transformers of the same scope; names that
/// are not registered, or belong to the other scope, are ignored.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn scope(&self) -> TransformerScope;

    fn before(&self) -> &'static [&'static str] {
        &[]
    }

    fn after(&self) -> &'static [&'static str] {
        &[]
    }

    /// Called once per loaded document for document-scoped transformers.
    fn transform_document(&self, _url: &str, _ctx: &mut TransformContext) -> Result<(), CompileError> {
        Ok(())
    }

    /// Called once, after every document pass, for global transformers.
    fn transform_global(&self, _ctx: &mut TransformContext) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Everything a pass may read or rewrite.
#[derive(Debug, Default)]
pub struct TransformContext {
    pub documents: DocumentSet,
    pub graph: SchemaGraph,
    pub collections: SchemaCollections,
    pub operations: Vec<OperationModel>,
    /// Intermediate schemas of discriminated hierarchies.
    pub base_schemas: BTreeSet<NodeId>,
    /// Errors found by passes, raised when a validator reaching the node is compiled.
    pub deferred_errors: HashMap<NodeId, CompileError>,
}

impl TransformContext {
    pub fn new(documents: DocumentSet) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    /// Nodes that own a discriminator map.
    pub fn discriminator_roots(&self) -> Vec<NodeId> {
        self.collections
            .objects
            .iter()
            .copied()
            .filter(|id| self.graph.node(*id).discriminator_map.is_some())
            .collect()
    }

    pub fn is_base_schema(&self, id: NodeId) -> bool {
        self.base_schemas.contains(&id)
    }

    /// Record a deferred error, keeping the first one per node.
    pub fn defer_error(&mut self, id: NodeId, error: CompileError) {
        tracing::warn!(node = %self.graph.node(id).source.location(), %error, "deferred compile error");
        self.deferred_errors.entry(id).or_insert(error);
    }
}

/// The built-in passes, in registration order.
pub fn default_transformers() -> Vec<Box<dyn Transformer>> {
    vec![
        Box::new(XmsPathsTransformer),
        Box::new(ReferenceFieldsTransformer),
        Box::new(ResolveNestedDefinitionsTransformer),
        Box::new(DiscoverVariantsTransformer),
        Box::new(DiscriminatorTransformer),
        Box::new(AllOfTransformer),
        Box::new(NoAdditionalPropertiesTransformer),
        Box::new(NullableTransformer),
        Box::new(PureObjectTransformer),
    ]
}

/// Run every scheduled transformer: document passes for each document in load
/// order, then the global passes once.
pub fn run_pipeline(
    transformers: &[Box<dyn Transformer>],
    schedule: &Schedule,
    ctx: &mut TransformContext,
) -> Result<(), CompileError> {
    for url in ctx.documents.urls() {
        for &index in &schedule.document {
            let transformer = &transformers[index];
            tracing::debug!(transformer = transformer.name(), %url, "running document pass");
            transformer.transform_document(&url, ctx)?;
        }
    }
    for &index in &schedule.global {
        let transformer = &transformers[index];
        tracing::debug!(transformer = transformer.name(), "running global pass");
        transformer.transform_global(ctx)?;
    }
    Ok(())
}
