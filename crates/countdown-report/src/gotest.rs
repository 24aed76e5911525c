//! Parser for verbose `go test` output
//!
//! Turns the text a `go test -v` invocation prints into a [`TestSuite`]. Test
//! log lines are attached to the case they belong to, whether the tool printed
//! them before or after the `--- FAIL` result line. Tests that started but
//! never reported a result (a panic, for example) become failing cases when
//! the package as a whole failed.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::trace;

use crate::model::{Failure, TestCase, TestSuite};

/// Longest line the parser accepts
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Errors produced while parsing tool output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A single line exceeded [`MAX_LINE_LEN`]
    #[error("line {line} is {len} bytes: token too long")]
    LineTooLong { line: usize, len: usize },
}

/// `--- PASS: TestName (0.01s)`, possibly indented for subtests
static RESULT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*--- (PASS|FAIL|SKIP): (\S+) \(([0-9.]+)(?:s| seconds)\)\s*$")
        .expect("Invalid regex")
});

static BENCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Benchmark\S*)\s+\d+\s+([0-9.]+) ns/op").expect("Invalid regex")
});

/// Package summary as the tool prints it: `ok  \t<pkg>\t0.01s`, `FAIL\t<pkg>\t0.01s`,
/// `ok  \t<pkg>\t(cached)` or `FAIL\t<pkg> [setup failed]`
static SUMMARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ok  |FAIL)\t(\S+)(?:\t([0-9.]+)s|\t\(cached\)| \[[a-z ]+\])")
        .expect("Invalid regex")
});

/// Parse verbose test output of one unit
pub fn parse_output(unit: &str, output: &str) -> Result<TestSuite, ParseError> {
    let mut cases: Vec<TestCase> = Vec::new();
    let mut running: Vec<String> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut stray: Vec<String> = Vec::new();
    let mut current: Option<usize> = None;
    let mut suite_name: Option<String> = None;
    let mut suite_time = Duration::ZERO;
    let mut package_failed = false;

    for (index, line) in output.lines().enumerate() {
        let line_no = index + 1;
        if line.len() > MAX_LINE_LEN {
            return Err(ParseError::LineTooLong {
                line: line_no,
                len: line.len(),
            });
        }

        if let Some(name) = line.strip_prefix("=== RUN") {
            let name = name.trim().to_string();
            if !running.contains(&name) {
                running.push(name);
            }
            pending.clear();
            current = None;
            continue;
        }
        if line.starts_with("=== PAUSE") || line.starts_with("=== CONT") {
            current = None;
            continue;
        }

        // a look-alike with an unreadable duration is plain output
        let result = RESULT_REGEX
            .captures(line)
            .and_then(|caps| parse_seconds(&caps[3]).map(|time| (caps, time)));
        if let Some((caps, time)) = result {
            let name = caps[2].to_string();
            let classname = suite_name.clone().unwrap_or_else(|| unit.to_string());
            let detail = std::mem::take(&mut pending);

            let mut case = TestCase::passed(classname, name.clone(), time);
            match &caps[1] {
                "FAIL" => case.failures.push(Failure::new("Failed", detail.join("\n"))),
                "SKIP" => case.skipped = Some(detail.join("\n")),
                _ => {}
            }
            trace!(unit, test = %name, outcome = &caps[1], "parsed result");

            running.retain(|r| r != &name);
            cases.push(case);
            current = Some(cases.len() - 1);
            continue;
        }

        if line.starts_with("--- BENCH:") {
            current = None;
            continue;
        }

        if let Some(caps) = BENCH_REGEX.captures(line) {
            let classname = suite_name.clone().unwrap_or_else(|| unit.to_string());
            cases.push(TestCase::passed(classname, &caps[1], Duration::ZERO));
            current = None;
            continue;
        }

        if let Some(caps) = SUMMARY_REGEX.captures(line) {
            suite_name = Some(caps[2].to_string());
            if let Some(time) = caps.get(3).and_then(|m| parse_seconds(m.as_str())) {
                suite_time = time;
            }
            if caps[1].trim_end() == "FAIL" {
                package_failed = true;
            }
            current = None;
            continue;
        }

        match line {
            "PASS" => {
                current = None;
                continue;
            }
            "FAIL" => {
                package_failed = true;
                current = None;
                continue;
            }
            _ => {}
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        let text = line.trim_start().to_string();
        match current {
            Some(idx) if indented => append_detail(&mut cases[idx], text),
            None if indented && !running.is_empty() => pending.push(text),
            _ => {
                if !text.is_empty() {
                    stray.push(line.to_string());
                }
            }
        }
    }

    let name = suite_name.unwrap_or_else(|| unit.to_string());
    for case in &mut cases {
        case.classname = name.clone();
    }

    if package_failed {
        for test in running {
            let mut detail = std::mem::take(&mut pending);
            detail.extend(stray.iter().cloned());
            cases.push(TestCase::failed(
                name.clone(),
                test,
                Duration::ZERO,
                Failure::new("Failed", detail.join("\n")),
            ));
        }
    }

    Ok(TestSuite {
        name,
        cases,
        time: suite_time,
    })
}

/// Parse `12.345` seconds without going through floating point
fn parse_seconds(value: &str) -> Option<Duration> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let secs: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = frac.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos: u32 = digits.parse().ok()?;
    Some(Duration::new(secs, nanos))
}

fn append_detail(case: &mut TestCase, text: String) {
    if let Some(failure) = case.failures.last_mut() {
        if !failure.detail.is_empty() {
            failure.detail.push('\n');
        }
        failure.detail.push_str(&text);
    } else if let Some(reason) = case.skipped.as_mut() {
        if !reason.is_empty() {
            reason.push('\n');
        }
        reason.push_str(&text);
    }
}
