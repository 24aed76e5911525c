//! Unit enumeration and test-name discovery

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use countdown_core::{ExecutionError, Result, Unit};
use regex::Regex;
use tracing::{debug, trace};

use crate::executor::run_process;

/// Lists the units a set of selectors expands to
#[async_trait]
pub trait UnitSource: Send + Sync {
    async fn list_units(&self, selectors: &[String]) -> Result<Vec<Unit>>;
}

/// Lists candidate test names of a unit
#[async_trait]
pub trait TestNameSource: Send + Sync {
    async fn candidate_names(&self, unit: &Unit) -> Result<Vec<String>>;
}

/// Time allowed for a single `list` invocation
const LIST_TIMEOUT: Duration = Duration::from_secs(300);

/// Enumerates units with `<tool> list`, remembering each unit's directory
pub struct GoList {
    tool: Vec<String>,
    env: HashMap<String, String>,
    current_dir: Option<PathBuf>,
    dirs: Mutex<HashMap<Unit, PathBuf>>,
}

impl GoList {
    pub fn new(tool: Vec<String>) -> Self {
        Self {
            tool,
            env: HashMap::new(),
            current_dir: None,
            dirs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// The directory cache; entries stay valid even if a holder panicked
    fn dirs(&self) -> MutexGuard<'_, HashMap<Unit, PathBuf>> {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn list(&self, selectors: &[String]) -> Result<Vec<(Unit, PathBuf)>> {
        let (program, prefix) = self
            .tool
            .split_first()
            .ok_or_else(|| ExecutionError::Enumeration("tool command is empty".to_string()))?;
        let mut args = prefix.to_vec();
        args.extend(["list", "-f", "{{.ImportPath}}\t{{.Dir}}"].map(String::from));
        args.extend(selectors.iter().cloned());

        let result = run_process(
            program,
            &args,
            &self.env,
            self.current_dir.as_deref(),
            LIST_TIMEOUT,
        )
        .await?;
        if !result.success() {
            return Err(ExecutionError::Enumeration(format!(
                "listing {:?} failed:\n{}",
                selectors, result.output
            ))
            .into());
        }

        let listed = parse_list_output(&result.output);
        self.dirs().extend(listed.iter().cloned());
        debug!(selectors = ?selectors, units = listed.len(), "listed units");
        Ok(listed)
    }

    /// Source directory of `unit`, listing it on first use
    pub async fn dir_of(&self, unit: &Unit) -> Result<PathBuf> {
        let cached = self.dirs().get(unit).cloned();
        if let Some(dir) = cached {
            return Ok(dir);
        }
        self.list(&[unit.to_string()])
            .await?
            .into_iter()
            .find(|(u, _)| u == unit)
            .map(|(_, dir)| dir)
            .ok_or_else(|| ExecutionError::Enumeration(format!("no directory for {}", unit)).into())
    }
}

/// Parse `<import path>\t<dir>` lines; lines without a tab are units without a directory
fn parse_list_output(output: &str) -> Vec<(Unit, PathBuf)> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((unit, dir)) => (Unit::new(unit), PathBuf::from(dir)),
            None => (Unit::new(line), PathBuf::new()),
        })
        .collect()
}

#[async_trait]
impl UnitSource for GoList {
    async fn list_units(&self, selectors: &[String]) -> Result<Vec<Unit>> {
        if selectors.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.list(selectors).await?.into_iter().map(|(u, _)| u).collect())
    }
}

/// Which top-level functions count as tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncMatcher {
    /// Any function named `Test*`
    GoTest,
    /// `<prefix>*` functions taking exactly one `*<param_type>` and returning nothing
    Integration { prefix: String, param_type: String },
}

/// `func Name(params) results {`
static FUNC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^func\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*([^{\n]*)").expect("Invalid regex")
});

impl FuncMatcher {
    /// Matched function names declared in one source file
    pub fn scan(&self, source: &str) -> Vec<String> {
        FUNC_REGEX
            .captures_iter(source)
            .filter(|caps| self.matches(&caps[1], &caps[2], caps[3].trim()))
            .map(|caps| caps[1].to_string())
            .collect()
    }

    fn matches(&self, name: &str, params: &str, results: &str) -> bool {
        match self {
            Self::GoTest => name.starts_with("Test"),
            Self::Integration { prefix, param_type } => {
                if !name.starts_with(prefix.as_str()) || !results.is_empty() {
                    return false;
                }
                let params = params.trim();
                if params.contains(',') {
                    return false;
                }
                let expected = format!("*{}", param_type);
                params.split_whitespace().last() == Some(expected.as_str())
            }
        }
    }
}

/// Discovers test names by scanning `*_test.go` files of each unit
pub struct TestFuncScanner {
    list: std::sync::Arc<GoList>,
    matcher: FuncMatcher,
}

impl TestFuncScanner {
    pub fn new(list: std::sync::Arc<GoList>, matcher: FuncMatcher) -> Self {
        Self { list, matcher }
    }

    /// Scan the test files directly inside `dir`
    pub fn scan_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let is_test_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_test.go"));
            if !is_test_file || !path.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(&path)?;
            for name in self.matcher.scan(&source) {
                trace!(file = %path.display(), test = %name, "found test");
                names.insert(name);
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[async_trait]
impl TestNameSource for TestFuncScanner {
    async fn candidate_names(&self, unit: &Unit) -> Result<Vec<String>> {
        let dir = self.list.dir_of(unit).await?;
        if dir.as_os_str().is_empty() {
            return Ok(Vec::new());
        }
        self.scan_dir(&dir)
    }
}
