//! Error types for spec loading, pipeline scheduling, and validator compilation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading specification documents.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("fragment not found: {fragment}")]
    FragmentNotFound { fragment: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors while ordering the transformer pipeline. Raised before any pass runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("dependency cycle among {scope} transformers: {}", transformers.join(", "))]
    DependencyCycle {
        scope: String,
        transformers: Vec<String>,
    },

    #[error("transformer '{name}' registered more than once")]
    DuplicateTransformer { name: String },
}

/// Errors while compiling a validator from the schema graph.
///
/// Cloneable so one failed build can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("cannot compute discriminator value for {location}")]
    UndefinedDiscriminatorValue { location: String },

    #[error("unresolvable reference '{reference}' at {location}")]
    UnresolvableReference { reference: String, location: String },

    #[error("invalid schema at {location}: {message}")]
    InvalidSchema { location: String, message: String },

    #[error("invalid x-ms-mutability value {value} at {location}")]
    InvalidMutability { location: String, value: String },

    #[error("unsupported parameter location '{location}' for parameter '{name}'")]
    UnsupportedParameterLocation { name: String, location: String },

    #[error("operation not found: {key}")]
    OperationNotFound { key: String },

    #[error("operation {key} has no response for status {status}")]
    ResponseNotFound { key: String, status: String },
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors in suppression directives.
#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("invalid suppression pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors while building a [`crate::SpecSet`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Suppression(#[from] SuppressionError),
}

impl BuildError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::Load(e) => e.exit_code(),
            BuildError::Compile(e) => e.exit_code(),
            BuildError::Schedule(_) | BuildError::Suppression(_) => 2,
        }
    }
}
