//! Discriminator map construction.
//!
//! Every object schema that inherits (through `allOf` references) from a
//! schema declaring `discriminator` is registered in that root's map under its
//! tag. The intermediate schemas of the chain become base schemas. A root
//! with no variants still gets a map holding its own tag.

use std::collections::{BTreeSet, HashMap};

use crate::error::CompileError;
use crate::graph::{DiscriminatorMap, NodeId, SchemaGraph};
use crate::transform::{TransformContext, Transformer, TransformerScope, ALL_OF, DISCRIMINATOR};

pub struct DiscriminatorTransformer;

impl Transformer for DiscriminatorTransformer {
    fn name(&self) -> &'static str {
        DISCRIMINATOR
    }

    fn scope(&self) -> TransformerScope {
        TransformerScope::Global
    }

    fn before(&self) -> &'static [&'static str] {
        &[ALL_OF]
    }

    fn transform_global(&self, ctx: &mut TransformContext) -> Result<(), CompileError> {
        let mut memo = HashMap::new();
        let objects = ctx.collections.objects.clone();

        for id in objects {
            let Some(root) = find_root(&ctx.graph, id, &mut ctx.base_schemas, &mut memo) else {
                continue;
            };
            let is_variant = root != id;
            if is_variant {
                warn_on_other_roots(&ctx.graph, id, root);
            }

            if ctx.graph.node(root).discriminator_map.is_none() {
                match tag_of(&ctx.graph, root) {
                    Some(tag) => ctx.graph.node_mut(root).discriminator_map = Some(DiscriminatorMap::new(tag)),
                    // An anonymous root is only an error once something inherits from it.
                    None if !is_variant => continue,
                    None => {
                        let error = undefined_tag(&ctx.graph, root);
                        ctx.defer_error(root, error);
                        continue;
                    }
                }
            }
            if !is_variant {
                continue;
            }

            match tag_of(&ctx.graph, id) {
                Some(tag) => {
                    if let Some(map) = ctx.graph.node_mut(root).discriminator_map.as_mut() {
                        map.insert_variant(tag, id);
                    }
                }
                None => {
                    let error = undefined_tag(&ctx.graph, id);
                    ctx.defer_error(root, error.clone());
                    ctx.defer_error(id, error);
                }
            }
        }
        Ok(())
    }
}

/// Find the polymorphic root of `id`.
///
/// A schema declaring `discriminator` is its own root. Otherwise the `allOf`
/// reference branches are searched in order; the first that leads to a root
/// is recorded as a base schema and the answer is memoized on `id`.
pub fn find_root(
    graph: &SchemaGraph,
    id: NodeId,
    base_schemas: &mut BTreeSet<NodeId>,
    memo: &mut HashMap<NodeId, Option<NodeId>>,
) -> Option<NodeId> {
    let node = graph.node(id);
    if node.discriminator.is_some() {
        return Some(id);
    }
    let all_of = node.all_of.as_ref()?;
    if let Some(known) = memo.get(&id) {
        return *known;
    }
    // Cycle guard: a chain that loops back here has no root through this path.
    memo.insert(id, None);

    for branch in all_of.iter().filter(|b| b.via_ref) {
        if let Some(root) = find_root(graph, branch.target, base_schemas, memo) {
            base_schemas.insert(branch.target);
            memo.insert(id, Some(root));
            return Some(root);
        }
    }
    None
}

/// The first matching branch wins; other branches reaching a different root
/// are reported but not registered.
fn warn_on_other_roots(graph: &SchemaGraph, id: NodeId, chosen: NodeId) {
    let Some(all_of) = graph.node(id).all_of.as_ref() else {
        return;
    };
    let mut scratch_bases = BTreeSet::new();
    let mut scratch_memo = HashMap::new();
    scratch_memo.insert(id, None);
    for branch in all_of.iter().filter(|b| b.via_ref) {
        if let Some(other) = find_root(graph, branch.target, &mut scratch_bases, &mut scratch_memo) {
            if other != chosen {
                tracing::warn!(
                    schema = %graph.node(id).source.location(),
                    chosen = %graph.node(chosen).source.location(),
                    ignored = %graph.node(other).source.location(),
                    "schema inherits from more than one discriminator root; using the first"
                );
            }
        }
    }
}

fn tag_of(graph: &SchemaGraph, id: NodeId) -> Option<String> {
    let node = graph.node(id);
    node.discriminator_value
        .clone()
        .or_else(|| node.name().map(str::to_string))
}

fn undefined_tag(graph: &SchemaGraph, id: NodeId) -> CompileError {
    CompileError::UndefinedDiscriminatorValue {
        location: graph.node(id).source.location(),
    }
}
