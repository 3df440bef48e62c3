//! Compiled validators.
//!
//! A transformed [`crate::graph::SchemaGraph`] is compiled into a flat arena
//! of [`CompiledNode`]s, one per reachable graph node plus the synthetic
//! nodes an operation assembler adds around them. Evaluation walks the arena
//! natively; scalar keywords are delegated to single-keyword `jsonschema`
//! validators.

mod checks;
mod compile;
mod eval;

use indexmap::IndexMap;
use serde_json::Value;

use crate::graph::SourceLocation;
use crate::issue::{translate, Failure, Issue};
use crate::types::{Direction, ValidationContext};

pub use checks::{DelegatedCheck, FormatCheck};
pub use compile::Compiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Additional {
    Allowed(bool),
    Schema(usize),
}

/// `readOnly`, `x-ms-mutability` and `x-ms-secret`, folded into flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Access {
    pub read_only: bool,
    pub has_mutability: bool,
    pub valid_in_request: bool,
    pub valid_in_response: bool,
    pub secret: bool,
}

impl Access {
    /// Declares mutability but cannot be read back.
    pub fn unreadable(&self) -> bool {
        self.has_mutability && !self.valid_in_response
    }
}

#[derive(Debug, Clone)]
pub struct Dispatch {
    pub property: String,
    /// Tag → compiled variant; `None` for the root's own tag.
    pub variants: IndexMap<String, Option<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledNode {
    pub source: SourceLocation,
    /// Property name used in mutability messages.
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub nullable: bool,
    pub enum_values: Option<Vec<Value>>,
    pub enum_model_as_string: bool,
    pub access: Access,
    pub skip_error: bool,
    pub properties: Option<IndexMap<String, usize>>,
    pub required: Vec<String>,
    pub additional: Option<Additional>,
    pub items: Option<usize>,
    pub all_of: Vec<usize>,
    pub any_of: Vec<usize>,
    pub one_of: Vec<usize>,
    pub unique_items: bool,
    /// Property dependencies: key → keys that must be present with it.
    pub dependencies: Vec<(String, Vec<String>)>,
    pub format: Option<FormatCheck>,
    pub checks: Vec<DelegatedCheck>,
    pub dispatch: Option<Dispatch>,
}

impl CompiledNode {
    /// A synthetic `{"type": "object"}` node.
    pub fn object(source: SourceLocation) -> Self {
        Self {
            source,
            type_name: Some("object".into()),
            properties: Some(IndexMap::new()),
            ..Self::default()
        }
    }
}

/// An immutable compiled schema, shareable across threads.
#[derive(Debug)]
pub struct CompiledValidator {
    nodes: Vec<CompiledNode>,
    root: usize,
}

impl CompiledValidator {
    pub(crate) fn new(nodes: Vec<CompiledNode>, root: usize) -> Self {
        Self { nodes, root }
    }

    /// Raw failures for `instance`, before translation.
    pub fn evaluate(&self, direction: Direction, instance: &Value) -> Vec<Failure> {
        eval::Evaluation::new(&self.nodes, direction).run(self.root, instance)
    }

    /// Validate `instance` and translate failures into issues.
    pub fn validate(&self, ctx: &ValidationContext, instance: &Value) -> Vec<Issue> {
        translate(self.evaluate(ctx.direction, instance), ctx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
