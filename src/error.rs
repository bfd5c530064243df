//! Error types for formflow

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// formflow errors
///
/// Template and expression evaluation never surfaces these: a failing
/// `{{ }}` block degrades to an empty string, `false` or `null` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A driver or flow template file is malformed. Scoped to one file.
    #[error("Configuration error in {path}: {message}")]
    Configuration { path: String, message: String },

    #[error("Target type cannot be resolved: {0}")]
    TargetResolution(String),

    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Flow {flow_id} is already {status}")]
    FlowClosed { flow_id: String, status: String },

    #[error("Stale write to flow {flow_id}: expected revision {expected}, found {actual}")]
    StaleWrite {
        flow_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid flow instructions: {0}")]
    InvalidInstructions(String),

    #[error("Expression parse error: {0}")]
    ExpressionParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for the given file
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
