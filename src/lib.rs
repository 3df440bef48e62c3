//! Swagger 2.0 payload validation
//!
//! Loads one or more Swagger 2.0 documents, rewrites their schema graph so
//! that discriminators, `allOf` inheritance, nullability and strict
//! additional-property rules are explicit, and compiles per-operation request
//! and response validators on demand.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use swagger_validate::{ErrorCode, LiveRequest, SpecSet, ValidationContext};
//!
//! let spec = json!({
//!     "swagger": "2.0",
//!     "paths": {
//!         "/pets": {
//!             "post": {
//!                 "operationId": "Pets_Create",
//!                 "parameters": [{
//!                     "name": "pet", "in": "body", "required": true,
//!                     "schema": {"$ref": "#/definitions/Pet"}
//!                 }],
//!                 "responses": {"201": {"description": "created"}}
//!             }
//!         }
//!     },
//!     "definitions": {
//!         "Pet": {
//!             "type": "object",
//!             "required": ["name"],
//!             "properties": {"name": {"type": "string"}}
//!         }
//!     }
//! });
//!
//! let set = SpecSet::builder().document("/specs/pets.json", spec).build().unwrap();
//! let request = LiveRequest {
//!     body: Some(json!({"name": "Rex", "color": "brown"})),
//!     ..LiveRequest::default()
//! };
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let issues = runtime
//!     .block_on(set.validate_request("Pets_Create", &request, &ValidationContext::request()))
//!     .unwrap();
//!
//! // Definitions are closed: unknown properties are reported.
//! assert_eq!(issues[0].code, ErrorCode::ObjectAdditionalProperties);
//! ```
//!
//! # Pipeline
//!
//! | Pass | Scope | Effect |
//! |------|-------|--------|
//! | `x-ms-paths` | document | Merge `x-ms-paths` into `paths` |
//! | `reference-fields` | document | Default `consumes` and `produces` |
//! | `resolve-nested-definitions` | document | Build schema nodes and operation models |
//! | `discover-variants` | global | Build variants reachable only by discriminator |
//! | `discriminator` | global | Attach tag → variant maps to polymorphic roots |
//! | `all-of` | global | Flatten inherited properties |
//! | `no-additional-properties` | global | Close object schemas that declare properties |
//! | `nullable` | global | Let optional and `x-nullable` properties accept `null` |
//! | `pure-object` | global | Accept any JSON value for bare `type: object` |

pub mod builder;
mod error;
pub mod graph;
mod issue;
pub mod loader;
pub mod operation;
pub mod runtime;
mod single_flight;
mod spec_set;
mod suppression;
pub mod transform;
mod types;

pub use error::{BuildError, CompileError, LoadError, ScheduleError, SuppressionError};
pub use graph::{NodeId, SchemaGraph, SchemaNode, SourceLocation};
pub use issue::{message, translate, ErrorCode, Failure, Issue, Keyword, Params, Severity};
pub use loader::{load_document, load_document_auto, load_document_str, DocumentSet};
pub use operation::{
    AssemblyOptions, LiveRequest, LiveResponse, OperationModel, OperationValidator, ParameterLocation,
    ParameterModel, ResponseModel,
};
pub use runtime::CompiledValidator;
pub use single_flight::SingleFlight;
pub use spec_set::{BuildReport, SpecSet, SpecSetBuilder, ValidatorConfig, DEFAULT_RESPONSE_CONTENT_TYPE};
pub use suppression::{SuppressionDirective, SuppressionSet, MATCH_ALL};
pub use transform::{default_transformers, TransformContext, Transformer, TransformerScope};
pub use types::{Direction, ValidationContext};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
