use havoc::error::{ConfigError, ExperimentError, MonkeyError, StoreError, TopologyError};
use havoc::HavocError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Havoc(#[from] HavocError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Operation cancelled by user")]
    Cancelled,
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Havoc(HavocError::Config(_)) => 2,
            CliError::Havoc(HavocError::Topology(_)) => 3,
            CliError::Havoc(HavocError::Store(_)) => 4,
            CliError::Havoc(HavocError::Experiment(ExperimentError::Timeout { .. })) => 124,
            CliError::Havoc(HavocError::Experiment(_)) => 5,
            CliError::Havoc(HavocError::Monkey(_)) => 6,
            CliError::InvalidArgument(_) => 64,
            CliError::Cancelled => 130, // Standard Unix signal for SIGINT
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Format error for user-friendly display
pub fn format_error(error: &CliError) -> String {
    match error {
        CliError::Config(e) | CliError::Havoc(HavocError::Config(e)) => {
            format!("Configuration Error: {}\n\nTry running 'havocctl config validate' to check your configuration.", e)
        }
        CliError::Havoc(HavocError::Topology(TopologyError::NamespaceNotFound { namespace })) => {
            format!("Namespace Not Found: {}\n\nCheck the namespace name and your kubectl context.", namespace)
        }
        CliError::Havoc(HavocError::Topology(TopologyError::Empty { namespace })) => {
            format!(
                "Empty Namespace: no pods found in {}\n\nCheck that workloads are running and that namespace_label_filter matches them.",
                namespace
            )
        }
        CliError::Havoc(HavocError::Store(StoreError::NotFound { path })) => {
            format!("Experiment Not Found: {}\n\nRun 'havocctl generate <namespace>' first, or omit the name to list experiments.", path)
        }
        CliError::Havoc(HavocError::Monkey(MonkeyError::MissingCredentials { missing })) => {
            format!(
                "Missing Grafana Credentials: {}\n\nExport GRAFANA_URL, GRAFANA_TOKEN and DASHBOARD_NAME before running the monkey.",
                missing
            )
        }
        CliError::Havoc(HavocError::Monkey(MonkeyError::MissingNamespace)) => {
            "No Experiments To Run: set monkey.dir in the configuration or pass a namespace to 'havocctl run'.".to_string()
        }
        CliError::Cancelled => "Operation cancelled by user.".to_string(),
        _ => error.to_string(),
    }
}
