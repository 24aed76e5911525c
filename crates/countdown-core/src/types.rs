//! Core types for Countdown

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one independently buildable/testable item (a Go package)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unit(String);

impl Unit {
    /// Create a new unit identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the identifier, used to name built binaries
    pub fn basename(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Unit {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every suite passed
    Passed,
    /// At least one suite failed
    Failed,
    /// The run could not take place (e.g. no historical snapshot)
    Skipped,
}

impl RunStatus {
    /// Returns the string representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a build/test/coverage/regression run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Overall verdict
    pub status: RunStatus,
    /// Tests suppressed by exclusion rules, keyed by unit
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub excluded_tests: BTreeMap<Unit, Vec<String>>,
    /// Tests the underlying framework chose to skip, keyed by unit
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped_tests: BTreeMap<Unit, Vec<String>>,
}

impl RunResult {
    /// A result with the given status and no bookkeeping
    pub fn with_status(status: RunStatus) -> Self {
        Self {
            status,
            excluded_tests: BTreeMap::new(),
            skipped_tests: BTreeMap::new(),
        }
    }

    pub fn passed() -> Self {
        Self::with_status(RunStatus::Passed)
    }

    pub fn failed() -> Self {
        Self::with_status(RunStatus::Failed)
    }

    pub fn skipped() -> Self {
        Self::with_status(RunStatus::Skipped)
    }

    /// Whether the run passed
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Passed
    }
}
