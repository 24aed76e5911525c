//! Coverage profile merging and Cobertura output

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use countdown_core::ReportError;
use tracing::{debug, info, warn};

use crate::junit::{escape_xml, report_path};

/// Mode line every merged profile starts with
pub const DEFAULT_MODE: &str = "set";

/// A merged coverage profile: one mode plus ordered, deduplicated block records
#[derive(Debug, Clone)]
pub struct CoverageProfile {
    mode: String,
    blocks: Vec<String>,
    seen: HashSet<String>,
}

impl Default for CoverageProfile {
    fn default() -> Self {
        Self::new(DEFAULT_MODE)
    }
}

impl CoverageProfile {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            blocks: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Merge the contents of one profile file, dropping its mode line
    pub fn merge_text(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with("mode:") {
                continue;
            }
            if self.seen.insert(line.to_string()) {
                self.blocks.push(line.to_string());
            }
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Block records in merge order
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render as a profile with a single leading mode line
    pub fn render(&self) -> String {
        let mut out = format!("mode: {}\n", self.mode);
        for block in &self.blocks {
            out.push_str(block);
            out.push('\n');
        }
        out
    }

    /// Render as a Cobertura XML document
    pub fn to_cobertura(&self, timestamp: i64) -> String {
        // package -> file -> line -> hits
        let mut packages: BTreeMap<String, BTreeMap<String, BTreeMap<u32, u64>>> = BTreeMap::new();
        for record in &self.blocks {
            let Some(block) = Block::parse(record) else {
                warn!(record = %record, "skipping malformed coverage block");
                continue;
            };
            let package = match block.file.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => ".".to_string(),
            };
            let lines = packages
                .entry(package)
                .or_default()
                .entry(block.file.clone())
                .or_default();
            for number in block.start_line..=block.end_line {
                let hits = lines.entry(number).or_insert(0);
                *hits = (*hits).max(block.count);
            }
        }

        let (covered, valid) = packages
            .values()
            .flat_map(|files| files.values())
            .fold((0usize, 0usize), |acc, lines| {
                let (c, v) = line_counts(lines);
                (acc.0 + c, acc.1 + v)
            });

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<!DOCTYPE coverage SYSTEM \"http://cobertura.sourceforge.net/xml/coverage-04.dtd\">\n");
        xml.push_str(&format!(
            "<coverage line-rate=\"{:.4}\" branch-rate=\"0\" lines-covered=\"{}\" lines-valid=\"{}\" branches-covered=\"0\" branches-valid=\"0\" complexity=\"0\" version=\"\" timestamp=\"{}\">\n",
            rate(covered, valid),
            covered,
            valid,
            timestamp
        ));
        xml.push_str("  <sources>\n    <source>.</source>\n  </sources>\n");
        xml.push_str("  <packages>\n");

        for (package, files) in &packages {
            let (pc, pv) = files.values().fold((0, 0), |acc, lines| {
                let (c, v) = line_counts(lines);
                (acc.0 + c, acc.1 + v)
            });
            xml.push_str(&format!(
                "    <package name=\"{}\" line-rate=\"{:.4}\" branch-rate=\"0\" complexity=\"0\">\n",
                escape_xml(package),
                rate(pc, pv)
            ));
            xml.push_str("      <classes>\n");
            for (file, lines) in files {
                let (fc, fv) = line_counts(lines);
                let class = file.rsplit('/').next().unwrap_or(file);
                xml.push_str(&format!(
                    "        <class name=\"{}\" filename=\"{}\" line-rate=\"{:.4}\" branch-rate=\"0\" complexity=\"0\">\n",
                    escape_xml(class),
                    escape_xml(file),
                    rate(fc, fv)
                ));
                xml.push_str("          <methods/>\n          <lines>\n");
                for (number, hits) in lines {
                    xml.push_str(&format!(
                        "            <line number=\"{}\" hits=\"{}\"/>\n",
                        number, hits
                    ));
                }
                xml.push_str("          </lines>\n        </class>\n");
            }
            xml.push_str("      </classes>\n    </package>\n");
        }

        xml.push_str("  </packages>\n</coverage>\n");
        xml
    }
}

/// One `file.go:12.3,15.2 4 1` record
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    file: String,
    start_line: u32,
    end_line: u32,
    count: u64,
}

impl Block {
    fn parse(record: &str) -> Option<Self> {
        let (file, rest) = record.rsplit_once(':')?;
        let mut fields = rest.split_whitespace();
        let range = fields.next()?;
        let _statements = fields.next()?;
        let count: u64 = fields.next()?.parse().ok()?;

        let (start, end) = range.split_once(',')?;
        let start_line: u32 = start.split('.').next()?.parse().ok()?;
        let end_line: u32 = end.split('.').next()?.parse().ok()?;
        if end_line < start_line {
            return None;
        }

        Some(Self {
            file: file.to_string(),
            start_line,
            end_line,
            count,
        })
    }
}

fn line_counts(lines: &BTreeMap<u32, u64>) -> (usize, usize) {
    (lines.values().filter(|h| **h > 0).count(), lines.len())
}

fn rate(covered: usize, valid: usize) -> f64 {
    if valid == 0 {
        0.0
    } else {
        covered as f64 / valid as f64
    }
}

/// Write `cobertura_<name>.xml` into `dir` and return its path
pub fn write_cobertura(
    dir: &Path,
    name: &str,
    profile: &CoverageProfile,
) -> Result<PathBuf, ReportError> {
    let path = report_path(dir, "cobertura", name);
    debug!(path = %path.display(), blocks = profile.blocks().len(), "writing Cobertura report");

    std::fs::create_dir_all(dir).map_err(|source| ReportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let xml = profile.to_cobertura(chrono::Utc::now().timestamp_millis());
    std::fs::write(&path, xml).map_err(|source| ReportError::Write {
        path: path.clone(),
        source,
    })?;

    info!(path = %path.display(), "Cobertura report written");
    Ok(path)
}
