//! xUnit XML report writer

use std::path::{Path, PathBuf};

use countdown_core::ReportError;
use tracing::{debug, info};

use crate::model::TestSuite;

/// Path of a report file: `<dir>/<prefix>_<sanitized name>.xml`
pub fn report_path(dir: &Path, prefix: &str, name: &str) -> PathBuf {
    dir.join(format!("{}_{}.xml", prefix, sanitize_name(name)))
}

/// Replace characters that do not belong in a file name with `_`
fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "report".to_string()
    } else {
        sanitized
    }
}

/// Render suites as an xUnit document
pub fn to_xml(name: &str, suites: &[TestSuite]) -> String {
    let tests: usize = suites.iter().map(|s| s.tests()).sum();
    let failures: usize = suites.iter().map(|s| s.failures()).sum();
    let skipped: usize = suites.iter().map(|s| s.skipped()).sum();
    let time: f64 = suites.iter().map(|s| s.time.as_secs_f64()).sum();

    let mut xml = String::new();

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
        escape_xml(name),
        tests,
        failures,
        skipped,
        time
    ));

    for suite in suites {
        xml.push_str(&format!(
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
            escape_xml(&suite.name),
            suite.tests(),
            suite.failures(),
            suite.skipped(),
            suite.time.as_secs_f64()
        ));

        for case in &suite.cases {
            let open = format!(
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\"",
                escape_xml(&case.name),
                escape_xml(&case.classname),
                case.time.as_secs_f64()
            );

            if !case.is_failed() && !case.is_skipped() {
                xml.push_str(&open);
                xml.push_str("/>\n");
                continue;
            }

            xml.push_str(&open);
            xml.push_str(">\n");
            for failure in &case.failures {
                xml.push_str(&format!(
                    "      <failure message=\"{}\" type=\"\">{}</failure>\n",
                    escape_xml(&failure.message),
                    escape_xml(&failure.detail)
                ));
            }
            if let Some(ref reason) = case.skipped {
                if reason.is_empty() {
                    xml.push_str("      <skipped/>\n");
                } else {
                    xml.push_str(&format!(
                        "      <skipped message=\"{}\"/>\n",
                        escape_xml(reason)
                    ));
                }
            }
            xml.push_str("    </testcase>\n");
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");

    xml
}

/// Write `tests_<name>.xml` into `dir` and return its path
pub fn write_report(dir: &Path, name: &str, suites: &[TestSuite]) -> Result<PathBuf, ReportError> {
    let path = report_path(dir, "tests", name);
    debug!(path = %path.display(), suites = suites.len(), "writing xUnit report");

    std::fs::create_dir_all(dir).map_err(|source| ReportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    std::fs::write(&path, to_xml(name, suites)).map_err(|source| ReportError::Write {
        path: path.clone(),
        source,
    })?;

    info!(path = %path.display(), "xUnit report written");
    Ok(path)
}

/// Escape special XML characters, dropping control characters XML 1.0 forbids
pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}
