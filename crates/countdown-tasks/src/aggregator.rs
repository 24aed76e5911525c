//! Collecting outcomes into suites, bookkeeping and a merged coverage profile

use std::collections::BTreeMap;
use std::time::Duration;

use countdown_core::{ReportError, Result, RunResult, RunStatus, Unit};
use countdown_report::{parse_output, CoverageProfile, Failure, ParseError, TestCase, TestSuite};
use tracing::{info, warn};

use crate::task::{ExecutionOutcome, OutcomeStatus, EXCLUDED_OUTPUT};

/// Failure message used when a line of output exceeds the parser's limit
pub const LINE_TOO_LONG_MESSAGE: &str = "test output contains lines that are too long to parse";

/// Trailer of the tool's `?   <unit>\t[no test files]` line
pub const NO_TEST_FILES: &str = "[no test files]";

/// Whether the tool reported that `unit` has no tests, or the unit was excluded
fn has_nothing_to_parse(unit: &Unit, output: &str) -> bool {
    if output.trim_end() == EXCLUDED_OUTPUT {
        return true;
    }
    output.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.next() == Some("?")
            && fields.next() == Some(unit.as_str())
            && line.trim_end().ends_with(NO_TEST_FILES)
    })
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct AggregateResult {
    /// One suite per reported unit, sorted by name
    pub suites: Vec<TestSuite>,
    /// Merged coverage, when collected
    pub coverage: Option<CoverageProfile>,
    /// Tests suppressed by exclusion rules
    pub excluded_tests: BTreeMap<Unit, Vec<String>>,
    /// Tests the framework skipped
    pub skipped_tests: BTreeMap<Unit, Vec<String>>,
    /// Units whose suite failed, sorted
    pub failed_units: Vec<Unit>,
}

impl AggregateResult {
    /// The run fails iff any suite fails
    pub fn passed(&self) -> bool {
        self.failed_units.is_empty()
    }

    pub fn run_result(&self) -> RunResult {
        let status = if self.passed() {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        RunResult {
            status,
            excluded_tests: self.excluded_tests.clone(),
            skipped_tests: self.skipped_tests.clone(),
        }
    }
}

/// Builds an [`AggregateResult`] one outcome at a time
#[derive(Debug)]
pub struct Aggregator {
    /// Case name of synthetic failures (`Build`, `Test`, `TestCoverage`)
    step: String,
    /// Build runs report one case per unit instead of parsing output
    build: bool,
    suffix: Option<String>,
    suites: Vec<TestSuite>,
    coverage: Option<CoverageProfile>,
    excluded_tests: BTreeMap<Unit, Vec<String>>,
    skipped_tests: BTreeMap<Unit, Vec<String>>,
    failed_units: Vec<Unit>,
}

impl Aggregator {
    fn with_step(step: &str) -> Self {
        Self {
            step: step.to_string(),
            build: false,
            suffix: None,
            suites: Vec::new(),
            coverage: None,
            excluded_tests: BTreeMap::new(),
            skipped_tests: BTreeMap::new(),
            failed_units: Vec::new(),
        }
    }

    /// One `Build` case per unit
    pub fn build() -> Self {
        Self {
            build: true,
            ..Self::with_step("Build")
        }
    }

    /// Parse test output into cases
    pub fn test() -> Self {
        Self::with_step("Test")
    }

    /// Parse test output and merge coverage profiles
    pub fn coverage() -> Self {
        Self {
            coverage: Some(CoverageProfile::default()),
            ..Self::with_step("TestCoverage")
        }
    }

    /// Append ` <suffix>` to every case name
    pub fn with_suffix(mut self, suffix: Option<String>) -> Self {
        self.suffix = suffix.filter(|s| !s.is_empty());
        self
    }

    /// Fold one outcome in; the coverage artifact is released on every path
    pub fn add(&mut self, outcome: ExecutionOutcome) -> Result<()> {
        let ExecutionOutcome {
            unit,
            status,
            output,
            duration,
            coverage,
            excluded_names,
        } = outcome;

        if let (Some(profile), Some(artifact)) = (self.coverage.as_mut(), coverage.as_ref()) {
            if status == OutcomeStatus::Passed {
                profile.merge_text(&artifact.read_profile(&unit)?);
            }
        }
        drop(coverage);

        if !excluded_names.is_empty() {
            info!(unit = %unit, excluded = ?excluded_names, "excluded tests");
            self.excluded_tests.insert(unit.clone(), excluded_names);
        }

        let Some(mut suite) = self.suite_for(&unit, status, &output, duration)? else {
            return Ok(());
        };

        let skipped = suite.skipped_names();
        if !skipped.is_empty() {
            info!(unit = %unit, skipped = ?skipped, "skipped tests");
            self.skipped_tests.insert(unit.clone(), skipped);
        }

        if suite.is_failed() {
            warn!(unit = %unit, status = %status, "unit failed\n{}", output);
            self.failed_units.push(unit);
        } else {
            info!(unit = %unit, "unit passed");
        }

        if let Some(ref suffix) = self.suffix {
            suite.append_suffix(&format!(" {}", suffix));
        }
        self.suites.push(suite);
        Ok(())
    }

    fn suite_for(
        &self,
        unit: &Unit,
        status: OutcomeStatus,
        output: &str,
        duration: Duration,
    ) -> Result<Option<TestSuite>> {
        let name = unit.to_string();
        let fail = |message: &str, detail: &str| {
            TestSuite::with_failure(name.clone(), self.step.clone(), message, detail, duration)
        };

        let suite = match status {
            OutcomeStatus::Excluded => return Ok(None),
            OutcomeStatus::BuildFailed => fail("build failure", output),
            OutcomeStatus::TimedOut => fail("timed out", output),
            OutcomeStatus::Passed if self.build => {
                let mut suite = TestSuite::new(name.clone());
                suite
                    .cases
                    .push(TestCase::passed(name.clone(), self.step.clone(), duration));
                suite.time = duration;
                suite
            }
            OutcomeStatus::TestFailed if self.build => fail("build failure", output),
            OutcomeStatus::Passed | OutcomeStatus::TestFailed => {
                let failed = status == OutcomeStatus::TestFailed;
                if has_nothing_to_parse(unit, output) {
                    if !failed {
                        return Ok(None);
                    }
                    return Ok(Some(fail("test failure", output)));
                }

                let mut suite = match parse_output(unit.as_str(), output) {
                    Ok(suite) => suite,
                    Err(ParseError::LineTooLong { line, len }) => {
                        warn!(unit = %unit, line, len, "output line too long to parse");
                        fail(LINE_TOO_LONG_MESSAGE, "")
                    }
                    Err(e) => {
                        return Err(ReportError::Parse {
                            unit: unit.to_string(),
                            message: e.to_string(),
                        }
                        .into())
                    }
                };
                if suite.time.is_zero() {
                    suite.time = duration;
                }
                if failed && !suite.is_failed() {
                    suite.cases.push(TestCase::failed(
                        suite.name.clone(),
                        self.step.clone(),
                        duration,
                        Failure::new("test failure", output),
                    ));
                }
                suite
            }
        };
        Ok(Some(suite))
    }

    pub fn finish(mut self) -> AggregateResult {
        self.suites.sort_by(|a, b| a.name.cmp(&b.name));
        self.failed_units.sort();
        AggregateResult {
            suites: self.suites,
            coverage: self.coverage,
            excluded_tests: self.excluded_tests,
            skipped_tests: self.skipped_tests,
            failed_units: self.failed_units,
        }
    }
}
