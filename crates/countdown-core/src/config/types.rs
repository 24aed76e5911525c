//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use super::duration::parse_duration;
use crate::error::ConfigError;

/// Main configuration for Countdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// External build/test tool invocation
    pub tool: ToolConfig,

    /// Default unit universe
    pub units: UnitsConfig,

    /// Build mode settings
    pub build: BuildConfig,

    /// Test mode settings
    pub test: TestConfig,

    /// Data-race test settings
    pub race: RaceConfig,

    /// Benchmark settings
    pub bench: BenchConfig,

    /// Coverage mode settings
    pub coverage: CoverageConfig,

    /// Integration test settings
    pub integration: IntegrationConfig,

    /// Regression workflow settings
    pub regression: RegressionConfig,

    /// Report output settings
    pub reports: ReportsConfig,

    /// Exclusion rules applied to every test run
    pub exclusions: Vec<ExclusionConfig>,

    /// Extra exclusion rules applied only to race runs
    pub race_exclusions: Vec<ExclusionConfig>,

    /// Selector groups per test name; part N-1 runs everything else
    pub test_parts: HashMap<String, Vec<String>>,
}

/// How the external tool is invoked and how many workers drive it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Command prefix, e.g. `["go"]` or `["v23", "go"]`
    pub command: Vec<String>,

    /// Worker count (defaults to available parallelism)
    pub workers: Option<usize>,

    /// Upper bound of the randomized per-worker startup delay
    pub stagger: String,

    /// Extra environment for every invocation
    pub env: HashMap<String, String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: vec!["go".to_string()],
            workers: None,
            stagger: "30s".to_string(),
            env: HashMap::new(),
        }
    }
}

/// The default unit universe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    /// Selectors understood by the enumeration collaborator (e.g. `./...`)
    pub defaults: Vec<String>,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            defaults: vec!["./...".to_string()],
        }
    }
}

/// Build mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Extra tool arguments
    pub args: Vec<String>,

    /// Directory receiving built binaries
    pub bin_dir: PathBuf,

    /// Per-unit timeout
    pub timeout: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            bin_dir: PathBuf::from("bin"),
            timeout: "10m".to_string(),
        }
    }
}

/// Test mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Per-unit timeout
    pub timeout: String,

    /// Extra tool arguments placed before the unit
    pub args: Vec<String>,

    /// Command that pre-builds test dependencies (empty disables it)
    pub prebuild: Vec<String>,

    /// Whether to append a `[<kind> - <os>,<arch>]` suffix to case names
    pub suffix: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout: "5m".to_string(),
            args: Vec::new(),
            prebuild: Vec::new(),
            suffix: true,
        }
    }
}

/// Data-race test settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub timeout: String,
    pub args: Vec<String>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            timeout: "15m".to_string(),
            args: vec!["-race".to_string()],
        }
    }
}

/// Benchmark settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub timeout: String,
    pub args: Vec<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            timeout: "5m".to_string(),
            args: vec![
                "-bench".to_string(),
                ".".to_string(),
                "-run".to_string(),
                "XXX".to_string(),
            ],
        }
    }
}

/// Coverage mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub timeout: String,
    pub args: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            timeout: "5m".to_string(),
            args: Vec::new(),
        }
    }
}

/// Integration test settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub timeout: String,

    /// `-run` pattern handed to the tool
    pub run_pattern: String,

    /// Arguments placed after the unit
    pub non_test_args: Vec<String>,

    /// Name prefix of integration test functions
    pub func_prefix: String,

    /// Required parameter type of integration test functions
    pub param_type: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            timeout: "5m".to_string(),
            run_pattern: "^TestV23".to_string(),
            non_test_args: vec!["-v23.tests".to_string()],
            func_prefix: "V23Test".to_string(),
            param_type: "v23tests.T".to_string(),
        }
    }
}

/// Regression workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Prefix of the environment overrides (`<prefix>REGTEST_DATE`, ...)
    pub env_prefix: String,

    /// Default `-run` pattern
    pub tests: String,

    /// Default binary set preset
    pub binset: String,

    /// Default age of the reference snapshot in days
    pub days: u32,

    /// Additional binary set presets
    pub binsets: BTreeMap<String, Vec<String>>,

    /// Directory holding freshly installed binaries
    pub new_bin_dir: PathBuf,

    /// Directory caching downloaded snapshots and the assembled `bin`
    pub work_dir: PathBuf,

    /// Command downloading a snapshot; `{date}` and `{dir}` are substituted
    pub download_command: Vec<String>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            env_prefix: "COUNTDOWN_".to_string(),
            tests: "^TestV23Hello.*".to_string(),
            binset: "prodservices".to_string(),
            days: 1,
            binsets: BTreeMap::new(),
            new_bin_dir: PathBuf::from("bin"),
            work_dir: PathBuf::from(".countdown/regtest"),
            download_command: Vec::new(),
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Directory receiving `tests_<name>.xml` and `cobertura_<name>.xml`
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// One exclusion rule as written in the config file
///
/// The platform conditions are evaluated once when the rule table is built;
/// a rule whose conditions do not hold stays in the table as inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Pattern over unit identifiers
    pub unit: String,

    /// Pattern over test names
    #[serde(default = "match_all")]
    pub name: String,

    /// Static on/off switch
    #[serde(default = "enabled")]
    pub enabled: bool,

    /// Only active on these operating systems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,

    /// Only active on these architectures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,

    /// Only active when running (or not running) under CI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<bool>,

    /// Why the rule exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn match_all() -> String {
    ".*".to_string()
}

fn enabled() -> bool {
    true
}

impl ExclusionConfig {
    /// Create an unconditional rule
    pub fn new(unit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            name: name.into(),
            enabled: true,
            os: Vec::new(),
            arch: Vec::new(),
            ci: None,
            reason: None,
        }
    }

    /// Set the static switch
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Restrict the rule to the given operating systems
    pub fn with_os(mut self, os: Vec<String>) -> Self {
        self.os = os;
        self
    }
}

macro_rules! timeout_accessor {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// Parsed per-unit timeout
                pub fn timeout_duration(&self) -> Result<Duration, ConfigError> {
                    parse_duration(&self.timeout)
                }
            }
        )*
    };
}

timeout_accessor!(BuildConfig, TestConfig, RaceConfig, BenchConfig, CoverageConfig, IntegrationConfig);

impl ToolConfig {
    /// Parsed upper bound of the worker stagger delay
    pub fn stagger_duration(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.stagger)
    }
}
