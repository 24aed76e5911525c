//! Error types for Countdown
//!
//! Unit outcomes (build failures, test failures, timeouts) are data and never
//! show up here. Everything in this module is an orchestration error: it
//! aborts the current operation and propagates to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CountdownError
pub type Result<T> = std::result::Result<T, CountdownError>;

/// Main error type for Countdown operations
#[derive(Debug, Error)]
pub enum CountdownError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Errors raised while enumerating or running units
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Report parsing and writing errors
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Regression workflow errors
    #[error(transparent)]
    Regression(#[from] RegressionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Duration string could not be parsed
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Regular expression did not compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Named binary set does not exist
    #[error("Binary set '{0}' is not valid")]
    UnknownBinSet(String),

    /// Regression direction is neither "old" nor "new"
    #[error("Regression direction '{0}' is not valid")]
    InvalidDirection(String),

    /// Environment override could not be parsed
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    /// Requested units are not part of the configured universe
    #[error("Requested unit '{unit}' is not one of {defaults:?}")]
    UnitNotAllowed { unit: String, defaults: Vec<String> },

    /// Test part index out of range
    #[error("Invalid part index: {index}/{last}")]
    InvalidPart { index: usize, last: usize },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while enumerating units or driving the external tool
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The external tool could not be started
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or reading from a subprocess failed
    #[error("Failed to collect output of '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Unit or test-name enumeration failed
    #[error("Enumeration failed: {0}")]
    Enumeration(String),

    /// A temporary coverage artifact could not be created or read
    #[error("Coverage artifact error for {unit}: {source}")]
    CoverageArtifact {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Fewer results arrived than units were dispatched
    #[error("Expected {expected} results, received {received}")]
    ResultsMissing { expected: usize, received: usize },
}

/// Report parsing and writing errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// Tool output could not be parsed for a reason other than line length
    #[error("Failed to parse output of {unit}: {message}")]
    Parse { unit: String, message: String },

    /// A report could not be written
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Regression workflow errors
#[derive(Debug, Error)]
pub enum RegressionError {
    /// Building the "new" provenance failed
    #[error("Building binaries failed: {0}")]
    Build(String),

    /// Fetching the historical snapshot failed for a reason other than absence
    #[error("Fetching snapshot for {date} failed: {reason}")]
    Snapshot { date: String, reason: String },

    /// Assembling the working binary directory failed
    #[error("Assembling binaries in {path} failed: {source}")]
    Assemble {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CountdownError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_transparent() {
        let err: CountdownError = ConfigError::UnknownBinSet("bogus".to_string()).into();
        assert_eq!(err.to_string(), "Binary set 'bogus' is not valid");
    }

    #[test]
    fn test_results_missing_message() {
        let err = ExecutionError::ResultsMissing {
            expected: 3,
            received: 2,
        };
        assert_eq!(err.to_string(), "Expected 3 results, received 2");
    }
}
