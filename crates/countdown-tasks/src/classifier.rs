//! Failure classification of a finished tool invocation

use countdown_core::Unit;

/// What a subprocess left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr
    pub output: String,
    /// Whether the hard timeout fired
    pub timed_out: bool,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Why a unit did not pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BuildFailed,
    TestFailed,
    TimedOut,
}

/// Classify a failed invocation of `unit`.
///
/// Exit code 2 is a compile error. Exit code 1 is a build failure only when
/// the output is the tool's `# <unit>` diagnostic ending in `[setup failed]`.
/// Any other code falls back to looking at the diagnostic prefix alone.
pub fn classify(result: &ProcessResult, unit: &Unit) -> FailureKind {
    if result.timed_out {
        return FailureKind::TimedOut;
    }

    let diagnostic_prefix = format!("# {}", unit);
    let has_prefix = result.output.starts_with(&diagnostic_prefix);

    match result.exit_code {
        Some(2) => FailureKind::BuildFailed,
        Some(1) => {
            if has_prefix && result.output.ends_with("[setup failed]\n") {
                FailureKind::BuildFailed
            } else {
                FailureKind::TestFailed
            }
        }
        _ if has_prefix => FailureKind::BuildFailed,
        _ => FailureKind::TestFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: Option<i32>, output: &str) -> ProcessResult {
        ProcessResult {
            exit_code: code,
            output: output.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn test_timeout_wins() {
        let mut r = result(Some(2), "# pkg\n");
        r.timed_out = true;
        assert_eq!(classify(&r, &Unit::new("pkg")), FailureKind::TimedOut);
    }

    #[test]
    fn test_exit_two_is_build_failure() {
        assert_eq!(
            classify(&result(Some(2), "anything"), &Unit::new("pkg")),
            FailureKind::BuildFailed
        );
    }

    #[test]
    fn test_exit_one_setup_failed() {
        let unit = Unit::new("v.io/x/ref/lib");
        let out = "# v.io/x/ref/lib\nimport cycle not allowed\nFAIL\tv.io/x/ref/lib [setup failed]\n";
        assert_eq!(classify(&result(Some(1), out), &unit), FailureKind::BuildFailed);
    }

    #[test]
    fn test_exit_one_plain_failure() {
        let unit = Unit::new("v.io/x/ref/lib");
        let out = "--- FAIL: TestX (0.00s)\nFAIL\n";
        assert_eq!(classify(&result(Some(1), out), &unit), FailureKind::TestFailed);

        // diagnostic prefix without the setup suffix
        let out = "# v.io/x/ref/lib\nvet: something\n";
        assert_eq!(classify(&result(Some(1), out), &unit), FailureKind::TestFailed);
    }

    #[test]
    fn test_other_codes_fall_back_to_prefix() {
        let unit = Unit::new("pkg");
        assert_eq!(classify(&result(Some(3), "# pkg\nerr"), &unit), FailureKind::BuildFailed);
        assert_eq!(classify(&result(None, "killed"), &unit), FailureKind::TestFailed);
    }
}
