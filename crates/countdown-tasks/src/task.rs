//! Tasks handed to workers and the outcomes they produce

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use countdown_core::{ExecutionError, Unit};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// One unit of work: run a unit, optionally restricted to specific tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    unit: Unit,
    specific_names: Option<Vec<String>>,
    excluded_names: Vec<String>,
}

impl Task {
    /// Run everything in the unit
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            specific_names: None,
            excluded_names: Vec::new(),
        }
    }

    /// Run only `names`; returns `None` when there is nothing left to run
    pub fn restricted(unit: Unit, names: Vec<String>, excluded_names: Vec<String>) -> Option<Self> {
        if names.is_empty() {
            return None;
        }
        Some(Self {
            unit,
            specific_names: Some(names),
            excluded_names,
        })
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Tests to select, `None` meaning all of them
    pub fn specific_names(&self) -> Option<&[String]> {
        self.specific_names.as_deref()
    }

    /// Tests suppressed by exclusion rules
    pub fn excluded_names(&self) -> &[String] {
        &self.excluded_names
    }
}

/// Classified outcome of running one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    BuildFailed,
    TestFailed,
    TimedOut,
    Passed,
    /// Every candidate test was excluded; no subprocess ran
    Excluded,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildFailed => "build failed",
            Self::TestFailed => "test failed",
            Self::TimedOut => "timed out",
            Self::Passed => "passed",
            Self::Excluded => "excluded",
        }
    }

    /// Whether the outcome counts against the run
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::BuildFailed | Self::TestFailed | Self::TimedOut)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporary coverage profile written by the tool
///
/// The file is removed when the artifact is dropped.
#[derive(Debug)]
pub struct CoverageArtifact {
    file: NamedTempFile,
}

impl CoverageArtifact {
    /// Allocate a fresh temporary file for `unit`
    pub fn create(unit: &Unit) -> Result<Self, ExecutionError> {
        let file = tempfile::Builder::new()
            .prefix("countdown-cover-")
            .suffix(".out")
            .tempfile()
            .map_err(|source| ExecutionError::CoverageArtifact {
                unit: unit.to_string(),
                source,
            })?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the profile the tool wrote; a missing or empty file reads as empty
    pub fn read_profile(&self, unit: &Unit) -> Result<String, ExecutionError> {
        let mut content = String::new();
        std::fs::File::open(self.file.path())
            .and_then(|mut f| f.read_to_string(&mut content))
            .map_err(|source| ExecutionError::CoverageArtifact {
                unit: unit.to_string(),
                source,
            })?;
        Ok(content)
    }
}

/// Everything a worker reports back about one unit
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub unit: Unit,
    pub status: OutcomeStatus,
    /// Interleaved stdout and stderr of the invocation
    pub output: String,
    pub duration: Duration,
    pub coverage: Option<CoverageArtifact>,
    pub excluded_names: Vec<String>,
}

/// Output recorded for units whose every test was excluded
pub const EXCLUDED_OUTPUT: &str = "package excluded";

impl ExecutionOutcome {
    /// Synthetic outcome for a unit whose tests were all excluded
    pub fn excluded(unit: Unit, excluded_names: Vec<String>) -> Self {
        Self {
            unit,
            status: OutcomeStatus::Excluded,
            output: EXCLUDED_OUTPUT.to_string(),
            duration: Duration::ZERO,
            coverage: None,
            excluded_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_rejects_empty_selection() {
        assert!(Task::restricted(Unit::new("a"), Vec::new(), vec!["TestX".to_string()]).is_none());
    }

    #[test]
    fn test_restricted_task() {
        let task = Task::restricted(
            Unit::new("a"),
            vec!["TestA".to_string()],
            vec!["TestB".to_string()],
        )
        .unwrap();
        assert_eq!(task.specific_names(), Some(&["TestA".to_string()][..]));
        assert_eq!(task.excluded_names(), &["TestB".to_string()]);
    }

    #[test]
    fn test_excluded_outcome() {
        let outcome = ExecutionOutcome::excluded(Unit::new("a"), vec!["TestA".to_string()]);
        assert_eq!(outcome.status, OutcomeStatus::Excluded);
        assert_eq!(outcome.output, "package excluded");
        assert!(!outcome.status.is_failure());
    }

    #[test]
    fn test_coverage_artifact_removed_on_drop() {
        let unit = Unit::new("a");
        let artifact = CoverageArtifact::create(&unit).unwrap();
        let path = artifact.path().to_path_buf();
        std::fs::write(&path, "mode: set\n").unwrap();
        assert_eq!(artifact.read_profile(&unit).unwrap(), "mode: set\n");

        drop(artifact);
        assert!(!path.exists());
    }
}
