//! Report model: suites of cases with failures and skips

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A failure attached to a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Short message
    pub message: String,
    /// Full detail, usually raw tool output
    pub detail: String,
}

impl Failure {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// A single test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub classname: String,
    pub name: String,
    pub time: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    /// Reason the framework skipped the case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl TestCase {
    /// A passing case
    pub fn passed(classname: impl Into<String>, name: impl Into<String>, time: Duration) -> Self {
        Self {
            classname: classname.into(),
            name: name.into(),
            time,
            failures: Vec::new(),
            skipped: None,
        }
    }

    /// A case with a single failure
    pub fn failed(
        classname: impl Into<String>,
        name: impl Into<String>,
        time: Duration,
        failure: Failure,
    ) -> Self {
        Self {
            failures: vec![failure],
            ..Self::passed(classname, name, time)
        }
    }

    pub fn is_failed(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// A suite of test cases, one per unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
    pub time: Duration,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            time: Duration::ZERO,
        }
    }

    /// A suite holding exactly one failing case
    pub fn with_failure(
        name: impl Into<String>,
        case_name: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
        time: Duration,
    ) -> Self {
        let name = name.into();
        let case = TestCase::failed(
            name.clone(),
            case_name,
            time,
            Failure::new(message, detail),
        );
        Self {
            name,
            cases: vec![case],
            time,
        }
    }

    pub fn tests(&self) -> usize {
        self.cases.len()
    }

    pub fn failures(&self) -> usize {
        self.cases.iter().filter(|c| c.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.cases.iter().filter(|c| c.is_skipped()).count()
    }

    /// A suite fails iff it has at least one failing case
    pub fn is_failed(&self) -> bool {
        self.failures() > 0
    }

    /// Names of cases the framework skipped
    pub fn skipped_names(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter(|c| c.is_skipped())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Append `suffix` to every case name
    pub fn append_suffix(&mut self, suffix: &str) {
        for case in &mut self.cases {
            case.name.push_str(suffix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_counts() {
        let mut suite = TestSuite::new("pkg");
        suite
            .cases
            .push(TestCase::passed("pkg", "TestA", Duration::ZERO));
        suite.cases.push(TestCase::failed(
            "pkg",
            "TestB",
            Duration::ZERO,
            Failure::new("Failed", "boom"),
        ));
        let mut skipped = TestCase::passed("pkg", "TestC", Duration::ZERO);
        skipped.skipped = Some("flaky".to_string());
        suite.cases.push(skipped);

        assert_eq!(suite.tests(), 3);
        assert_eq!(suite.failures(), 1);
        assert_eq!(suite.skipped(), 1);
        assert!(suite.is_failed());
        assert_eq!(suite.skipped_names(), vec!["TestC"]);
    }

    #[test]
    fn test_with_failure() {
        let suite = TestSuite::with_failure(
            "v.io/x/ref",
            "Build",
            "build failure",
            "# v.io/x/ref\nundefined: x",
            Duration::from_secs(1),
        );
        assert_eq!(suite.tests(), 1);
        assert!(suite.is_failed());
        assert_eq!(suite.cases[0].classname, "v.io/x/ref");
        assert_eq!(suite.cases[0].failures[0].message, "build failure");
    }

    #[test]
    fn test_append_suffix() {
        let mut suite = TestSuite::new("pkg");
        suite
            .cases
            .push(TestCase::passed("pkg", "TestA", Duration::ZERO));
        suite.append_suffix(" [GoTest - linux,amd64]");
        assert_eq!(suite.cases[0].name, "TestA [GoTest - linux,amd64]");
    }
}
