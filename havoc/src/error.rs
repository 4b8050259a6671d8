//! Error handling for havoc
//!
//! Every area of the crate owns a focused error enum; [`HavocError`] wraps
//! them so callers that drive a whole pipeline (generate, apply, run) can
//! propagate with `?` and still match on the failing area.

use std::io;

use thiserror::Error;

use crate::experiment::FaultKind;
use crate::lifecycle::ChaosStatus;

/// The main error type for havoc
#[derive(Error, Debug)]
pub enum HavocError {
    /// Topology discovery and analysis errors
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Experiment generation and rendering errors
    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    /// Specification directory errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Errors applying a single experiment
    #[error("Experiment error: {0}")]
    Experiment(#[from] ExperimentError),

    /// Lifecycle state machine errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Chaos monkey errors
    #[error("Monkey error: {0}")]
    Monkey(#[from] MonkeyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cluster control-plane errors
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Dashboard annotation errors
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Topology read and analysis errors
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("no namespace found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("no pods found inside namespace {namespace}, namespace is empty or check your filter")]
    Empty { namespace: String },

    #[error("failed to read topology of namespace {namespace}: {source}")]
    Unavailable {
        namespace: String,
        #[source]
        source: ClusterError,
    },
}

/// Experiment generation errors
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("failed to render {kind} template for {name}: {reason}")]
    TemplateRender {
        kind: FaultKind,
        name: String,
        reason: String,
    },

    #[error("duplicate experiment name {name} for kind {kind}")]
    DuplicateName { kind: FaultKind, name: String },
}

/// Specification store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to reset experiments dir {path}: {source}")]
    Reset {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write experiment {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read experiment {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("experiments dir walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("experiment file not found: {path}")]
    NotFound { path: String },
}

/// Errors applying a single experiment against the cluster
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("error applying experiment manifest {kind}/{name} in {namespace}: {source}")]
    Apply {
        kind: FaultKind,
        name: String,
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("waiting for experiment {kind}/{name} to finish timed out: {source}")]
    Timeout {
        kind: FaultKind,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to delete experiment {kind}/{name}: {source}")]
    Cleanup {
        kind: FaultKind,
        name: String,
        #[source]
        source: ClusterError,
    },
}

/// Lifecycle state machine errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("invalid chaos transition for {description}: {from} -> {to}")]
    InvalidTransition {
        description: String,
        from: ChaosStatus,
        to: ChaosStatus,
    },

    #[error("chaos creation failed: {reason}")]
    CreationFailed { reason: String },

    #[error("chaos creation task ended without reporting an outcome")]
    OutcomeLost,
}

/// Chaos monkey errors
#[derive(Error, Debug)]
pub enum MonkeyError {
    #[error("monkey mode is invalid: {mode:?}, should be either \"seq\" or \"rand\"")]
    InvalidMode { mode: String },

    #[error("in order to run monkey you need to set GRAFANA_URL/GRAFANA_TOKEN/DASHBOARD_NAME vars (missing {missing})")]
    MissingCredentials { missing: String },

    #[error("no experiments dir configured for the monkey and no namespace given to generate from")]
    MissingNamespace,
}

/// Configuration related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Invalid duration {value:?}, expected Go duration format such as 1h2m3s or 300ms")]
    InvalidDuration { value: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Configuration file permission denied: {path}")]
    PermissionDenied { path: String },
}

/// Errors from the cluster control-plane collaborator
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("command {command} failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("failed to parse {what} output: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Dashboard annotation errors
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("dashboard rejected annotation with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HavocError>;

/// A specialized result type for topology operations
pub type TopologyResult<T> = std::result::Result<T, TopologyError>;

/// A specialized result type for generation operations
pub type GenerateResult<T> = std::result::Result<T, GenerateError>;

/// A specialized result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A specialized result type for experiment application
pub type ExperimentResult<T> = std::result::Result<T, ExperimentError>;

/// A specialized result type for lifecycle operations
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// A specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for cluster operations
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// A specialized result type for annotation operations
pub type AnnotationResult<T> = std::result::Result<T, AnnotationError>;

impl HavocError {
    /// Check if retrying the same operation could succeed
    ///
    /// Input, rendering and timeout errors are never retried; only transient
    /// collaborator failures are.
    pub fn is_retryable(&self) -> bool {
        match self {
            HavocError::Topology(TopologyError::Unavailable { .. }) => true,
            HavocError::Annotation(AnnotationError::Http(_)) => true,
            HavocError::Io(io_error) => {
                matches!(io_error.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
            }
            _ => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HavocError::Topology(_) => "topology",
            HavocError::Generate(_) => "generate",
            HavocError::Store(_) => "store",
            HavocError::Experiment(_) => "experiment",
            HavocError::Lifecycle(_) => "lifecycle",
            HavocError::Monkey(_) => "monkey",
            HavocError::Config(_) => "config",
            HavocError::Cluster(_) => "cluster",
            HavocError::Annotation(_) => "annotation",
            HavocError::Io(_) => "io",
            HavocError::Json(_) => "serialization",
        }
    }
}
