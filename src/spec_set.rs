//! The [`SpecSet`] facade: loaded documents, the transformed graph and the
//! compiled-validator caches.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BuildError, CompileError, LoadError};
use crate::issue::{ErrorCode, Issue, Params};
use crate::loader::{load_document, load_document_auto, DocumentSet};
use crate::operation::{
    AssemblyOptions, Assembler, LiveRequest, LiveResponse, OperationModel, OperationValidator,
};
use crate::single_flight::SingleFlight;
use crate::suppression::{SuppressionDirective, SuppressionSet};
use crate::transform::{default_transformers, run_pipeline, schedule, TransformContext, Transformer};
use crate::types::{Direction, ValidationContext};

/// Content type assumed for a response body without `content-type`.
pub const DEFAULT_RESPONSE_CONTENT_TYPE: &str = "application/octet-stream";

/// Validator settings, loadable from a JSON or YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorConfig {
    pub suppressions: Vec<SuppressionDirective>,
    /// When non-empty, only these codes are reported.
    pub include_errors: Vec<ErrorCode>,
    pub skip_trivial_parameters: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            suppressions: Vec::new(),
            include_errors: Vec::new(),
            skip_trivial_parameters: true,
        }
    }
}

impl ValidatorConfig {
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let raw = load_document(path)?;
        serde_json::from_value(raw).map_err(|source| LoadError::InvalidJson { source })
    }

    /// Context carrying the configured `include_errors` filter.
    pub fn context(&self, direction: Direction) -> ValidationContext {
        let mut ctx = match direction {
            Direction::Request => ValidationContext::request(),
            Direction::Response => ValidationContext::response(""),
        };
        if !self.include_errors.is_empty() {
            ctx = ctx.include_errors(self.include_errors.iter().copied());
        }
        ctx
    }
}

/// Builder for a [`SpecSet`].
pub struct SpecSetBuilder {
    documents: DocumentSet,
    transformers: Vec<Box<dyn Transformer>>,
    suppressions: Vec<SuppressionDirective>,
    options: AssemblyOptions,
    load_external: bool,
}

impl Default for SpecSetBuilder {
    fn default() -> Self {
        Self {
            documents: DocumentSet::new(),
            transformers: default_transformers(),
            suppressions: Vec::new(),
            options: AssemblyOptions::default(),
            load_external: true,
        }
    }
}

impl SpecSetBuilder {
    /// Load a root document from a file path or URL.
    pub fn load(mut self, source: &str) -> Result<Self, LoadError> {
        let document = load_document_auto(source)?;
        self.documents.insert_root(source, document);
        Ok(self)
    }

    /// Add an already parsed root document under `url`.
    pub fn document(mut self, url: &str, document: Value) -> Self {
        self.documents.insert_root(url, document);
        self
    }

    /// Add a document that roots refer to.
    pub fn referenced_document(mut self, url: &str, document: Value) -> Self {
        self.documents.insert_referenced(url, document);
        self
    }

    /// Register an additional transformer.
    pub fn transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Replace the whole pass set, built-in passes included.
    pub fn transformers(mut self, transformers: Vec<Box<dyn Transformer>>) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn suppression(mut self, directive: SuppressionDirective) -> Self {
        self.suppressions.push(directive);
        self
    }

    pub fn suppressions(mut self, directives: impl IntoIterator<Item = SuppressionDirective>) -> Self {
        self.suppressions.extend(directives);
        self
    }

    /// Skip plain string path parameters and a plain `api-version` query parameter.
    pub fn skip_trivial_parameters(mut self, skip: bool) -> Self {
        self.options.skip_trivial_parameters = skip;
        self
    }

    /// Fetch documents referenced by `$ref` that were not added explicitly.
    pub fn load_external_refs(mut self, load: bool) -> Self {
        self.load_external = load;
        self
    }

    pub fn config(self, config: &ValidatorConfig) -> Self {
        self.suppressions(config.suppressions.iter().cloned())
            .skip_trivial_parameters(config.skip_trivial_parameters)
    }

    /// Schedule the transformers, then load references and run every pass.
    ///
    /// A scheduling error is raised before any document is touched.
    pub fn build(self) -> Result<SpecSet, BuildError> {
        let order = schedule(&self.transformers)?;
        let suppressions = Arc::new(SuppressionSet::new(self.suppressions)?);

        let mut documents = self.documents;
        if self.load_external {
            documents.load_external_refs()?;
        }
        let mut ctx = TransformContext::new(documents);
        run_pipeline(&self.transformers, &order, &mut ctx)?;

        let mut by_key = HashMap::new();
        let mut by_operation_id = HashMap::new();
        for (index, operation) in ctx.operations.iter().enumerate() {
            by_key.insert(operation.key.clone(), index);
            if let Some(id) = &operation.operation_id {
                if by_operation_id.contains_key(id) {
                    tracing::warn!(operation_id = %id, key = %operation.key, "duplicate operationId; keeping the first");
                } else {
                    by_operation_id.insert(id.clone(), index);
                }
            }
        }
        tracing::debug!(
            documents = ctx.documents.len(),
            nodes = ctx.graph.len(),
            operations = ctx.operations.len(),
            "spec set built"
        );

        Ok(SpecSet {
            ctx,
            by_key,
            by_operation_id,
            options: self.options,
            suppressions,
            requests: SingleFlight::new(),
            responses: SingleFlight::new(),
        })
    }
}

type Compiled = Result<Arc<OperationValidator>, Arc<CompileError>>;

/// Outcome of [`SpecSet::build_all`].
#[derive(Debug, Default)]
pub struct BuildReport {
    pub compiled: usize,
    /// Validator key → compile error.
    pub errors: Vec<(String, Arc<CompileError>)>,
}

/// Transformed specifications with lazily compiled, shared validators.
#[derive(Debug)]
pub struct SpecSet {
    ctx: TransformContext,
    by_key: HashMap<String, usize>,
    by_operation_id: HashMap<String, usize>,
    options: AssemblyOptions,
    suppressions: Arc<SuppressionSet>,
    requests: SingleFlight<String, OperationValidator, CompileError>,
    responses: SingleFlight<String, OperationValidator, CompileError>,
}

impl SpecSet {
    pub fn builder() -> SpecSetBuilder {
        SpecSetBuilder::default()
    }

    /// The transformed graph, collections and discriminator sets.
    pub fn context(&self) -> &TransformContext {
        &self.ctx
    }

    pub fn operations(&self) -> &[OperationModel] {
        &self.ctx.operations
    }

    /// Operation by key (`url#/paths/...`) or by `operationId`.
    pub fn operation(&self, key: &str) -> Option<&OperationModel> {
        self.by_key
            .get(key)
            .or_else(|| self.by_operation_id.get(key))
            .map(|&index| &self.ctx.operations[index])
    }

    /// Transformed definition `name` of the first root document that has it.
    pub fn definition(&self, name: &str) -> Option<Value> {
        self.ctx
            .documents
            .urls()
            .iter()
            .filter(|url| self.ctx.documents.is_root(url))
            .find_map(|url| self.ctx.graph.definition(url, name))
            .map(|id| self.ctx.graph.to_value(id))
    }

    fn assembler(&self) -> Assembler<'_> {
        Assembler::new(
            &self.ctx.graph,
            &self.ctx.deferred_errors,
            self.options,
            Arc::clone(&self.suppressions),
        )
    }

    fn not_found(key: &str) -> Arc<CompileError> {
        Arc::new(CompileError::OperationNotFound { key: key.to_string() })
    }

    /// Request validator of an operation, compiled at most once.
    pub async fn request_validator(&self, key: &str) -> Compiled {
        let operation = self.operation(key).ok_or_else(|| Self::not_found(key))?;
        self.requests
            .get_or_build(operation.key.clone(), || async {
                tokio::task::yield_now().await;
                self.assembler().request(operation)
            })
            .await
    }

    /// Response validator for `status` of an operation, compiled at most once.
    pub async fn response_validator(&self, key: &str, status: &str) -> Compiled {
        let operation = self.operation(key).ok_or_else(|| Self::not_found(key))?;
        let response = operation.response(status).ok_or_else(|| {
            Arc::new(CompileError::ResponseNotFound {
                key: operation.key.clone(),
                status: status.to_string(),
            })
        })?;
        self.responses
            .get_or_build(response.key.clone(), || async {
                tokio::task::yield_now().await;
                self.assembler().response(operation, response)
            })
            .await
    }

    /// Validate a live request. The `content-type`, when sent, must be one
    /// of the operation's `consumes`.
    pub async fn validate_request(
        &self,
        key: &str,
        request: &LiveRequest,
        ctx: &ValidationContext,
    ) -> Result<Vec<Issue>, Arc<CompileError>> {
        let validator = self.request_validator(key).await?;
        let mut issues = Vec::new();
        let content_type = content_type_of(&request.headers);
        if let Some(content_type) = content_type {
            check_content_type(&validator, &content_type, ctx, &mut issues);
        }
        issues.extend(validator.validate(ctx, &validator.request_payload(request)));
        Ok(issues)
    }

    /// Validate a live response against the response declared for its
    /// status code.
    pub async fn validate_response(
        &self,
        key: &str,
        response: &LiveResponse,
        ctx: &ValidationContext,
    ) -> Result<Vec<Issue>, Arc<CompileError>> {
        let ctx = ValidationContext {
            direction: Direction::Response,
            status_code: Some(response.status_code.clone()),
            include_errors: ctx.include_errors.clone(),
        };
        let operation = self.operation(key).ok_or_else(|| Self::not_found(key))?;
        if operation.response(&response.status_code).is_none() {
            let code = ErrorCode::InvalidResponseCode;
            if !ctx.includes(code) {
                return Ok(Vec::new());
            }
            let params = Params::Data(json!(response.status_code));
            return Ok(vec![Issue::from_code(code, &params, &operation.url)]);
        }

        let validator = self.response_validator(key, &response.status_code).await?;
        let mut issues = Vec::new();
        if validator.has_body_schema() {
            let content_type = response
                .content_type()
                .unwrap_or_else(|| DEFAULT_RESPONSE_CONTENT_TYPE.to_string());
            check_content_type(&validator, &content_type, &ctx, &mut issues);
        }
        issues.extend(validator.validate(&ctx, &validator.response_payload(response)));
        Ok(issues)
    }

    /// Compile every request and response validator.
    ///
    /// In background mode the task yields between operations so that other
    /// tasks on the same runtime keep making progress.
    pub async fn build_all(&self, background: bool) -> BuildReport {
        let mut report = BuildReport::default();
        for operation in &self.ctx.operations {
            let mut results = vec![(operation.key.clone(), self.request_validator(&operation.key).await)];
            for (status, response) in &operation.responses {
                results.push((response.key.clone(), self.response_validator(&operation.key, status).await));
            }
            for (key, result) in results {
                match result {
                    Ok(_) => report.compiled += 1,
                    Err(error) => {
                        tracing::warn!(%key, %error, "validator compilation failed");
                        report.errors.push((key, error));
                    }
                }
            }
            if background {
                tokio::task::yield_now().await;
            }
        }
        report
    }

    /// Validators compiled so far, failed builds included.
    pub fn compilation_count(&self) -> usize {
        self.requests.builds() + self.responses.builds()
    }
}

fn content_type_of(headers: &serde_json::Map<String, Value>) -> Option<String> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, v)| v.as_str())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Declared media types may carry parameters (`application/json;odata=minimalmetadata`).
fn check_content_type(
    validator: &OperationValidator,
    content_type: &str,
    ctx: &ValidationContext,
    issues: &mut Vec<Issue>,
) {
    let allowed = validator.media_types();
    let accepted = allowed.iter().any(|m| {
        m == content_type || (m.contains(';') && m.split(';').next().is_some_and(|base| base.contains(content_type)))
    });
    if accepted || !ctx.includes(ErrorCode::InvalidContentType) {
        return;
    }
    let params = Params::Format {
        format: content_type.to_string(),
        data: json!(allowed.join(", ")),
    };
    let url = crate::loader::split_ref(validator.key()).0;
    issues.push(Issue::from_code(ErrorCode::InvalidContentType, &params, url));
}
