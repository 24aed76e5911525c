//! Regression workflow
//!
//! Reruns the integration tests against a directory of binaries mixed from
//! two provenances: a fresh build ("new") and a historical snapshot ("old").
//! In the `Old` phase the held-out binary set comes from the snapshot and
//! everything else from the fresh build; the `New` phase swaps the roles.

mod binaries;
mod snapshot;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use countdown_core::config::RegressionConfig;
use countdown_core::{ConfigError, Result, RunResult, RunStatus};
use tracing::{info, warn};

pub use binaries::{assemble_binaries, BinarySet};
pub use snapshot::{
    BinaryBuilder, CommandSnapshotSource, InstallBuilder, SnapshotSource, NO_SNAPSHOT_EXIT_CODE,
};

use crate::pipeline::{Pipeline, TestKind, TestOptions, BIN_DIR_VAR};

/// Date format of snapshots and of `REGTEST_DATE`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which provenance the held-out binaries come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegressionDirection {
    /// Held-out binaries are old, the rest new
    Old,
    /// Held-out binaries are new, the rest old
    New,
}

impl RegressionDirection {
    pub fn parse(value: &str) -> std::result::Result<Self, ConfigError> {
        match value {
            "old" => Ok(Self::Old),
            "new" => Ok(Self::New),
            other => Err(ConfigError::InvalidDirection(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Old => "old",
            Self::New => "new",
        }
    }
}

impl fmt::Display for RegressionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw regression overrides read from `<prefix>REGTEST_*` variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegressionEnv {
    prefix: String,
    pub date: Option<String>,
    pub days: Option<String>,
    pub binset: Option<String>,
    pub binaries: Option<String>,
    pub direction: Option<String>,
    pub tests: Option<String>,
}

impl RegressionEnv {
    /// Read the overrides from the process environment
    pub fn from_env(prefix: &str) -> Self {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Read the overrides through `lookup`; empty values count as unset
    pub fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |suffix: &str| lookup(&format!("{}REGTEST_{}", prefix, suffix)).filter(|v| !v.is_empty());
        Self {
            prefix: prefix.to_string(),
            date: get("DATE"),
            days: get("DAYS"),
            binset: get("BINSET"),
            binaries: get("BINARIES"),
            direction: get("DIR"),
            tests: get("TESTS"),
        }
    }

    /// Full name of the `REGTEST_<suffix>` variable
    pub fn var(&self, suffix: &str) -> String {
        format!("{}REGTEST_{}", self.prefix, suffix)
    }
}

/// Resolved settings of one regression run
#[derive(Debug, Clone)]
pub struct RegressionOptions {
    /// Date of the reference snapshot
    pub date: NaiveDate,
    /// Binaries taken from the first provenance of each phase
    pub binaries: BinarySet,
    /// Phases to run, in order
    pub directions: Vec<RegressionDirection>,
    /// `-run` pattern of the integration tests
    pub tests: String,
    /// Requested selectors; empty means the configured defaults
    pub selectors: Vec<String>,
    pub workers: Option<usize>,
}

impl RegressionOptions {
    /// Combine configured defaults with environment overrides
    pub fn resolve(
        config: &RegressionConfig,
        env: &RegressionEnv,
        today: NaiveDate,
    ) -> std::result::Result<Self, ConfigError> {
        let invalid = |suffix: &str, value: &str, reason: String| ConfigError::InvalidEnv {
            var: env.var(suffix),
            value: value.to_string(),
            reason,
        };

        let date = match (&env.date, &env.days) {
            (Some(date), _) => NaiveDate::parse_from_str(date, DATE_FORMAT)
                .map_err(|e| invalid("DATE", date, e.to_string()))?,
            (None, days) => {
                let days = match days {
                    Some(days) => days
                        .parse::<u32>()
                        .map_err(|e| invalid("DAYS", days, e.to_string()))?,
                    None => config.days,
                };
                today
                    .checked_sub_days(Days::new(u64::from(days)))
                    .ok_or_else(|| invalid("DAYS", &days.to_string(), "date out of range".to_string()))?
            }
        };

        let binaries = match (&env.binset, &env.binaries) {
            (Some(name), _) => BinarySet::preset(name, &config.binsets)?,
            (None, Some(list)) => BinarySet::parse_list(list),
            (None, None) => BinarySet::preset(&config.binset, &config.binsets)?,
        };

        let directions = match &env.direction {
            Some(direction) => vec![RegressionDirection::parse(direction)?],
            None => vec![RegressionDirection::Old, RegressionDirection::New],
        };

        Ok(Self {
            date,
            binaries,
            directions,
            tests: env.tests.clone().unwrap_or_else(|| config.tests.clone()),
            selectors: Vec::new(),
            workers: None,
        })
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// Runs the integration tests once per direction against mixed binaries
pub struct RegressionWorkflow {
    pipeline: Arc<Pipeline>,
    builder: Arc<dyn BinaryBuilder>,
    snapshots: Arc<dyn SnapshotSource>,
    options: RegressionOptions,
    out_dir: PathBuf,
}

impl RegressionWorkflow {
    pub fn new(
        pipeline: Arc<Pipeline>,
        builder: Arc<dyn BinaryBuilder>,
        snapshots: Arc<dyn SnapshotSource>,
        options: RegressionOptions,
    ) -> Self {
        let out_dir = pipeline
            .resolve(&pipeline.config().regression.work_dir)
            .join("bin");
        Self {
            pipeline,
            builder,
            snapshots,
            options,
            out_dir,
        }
    }

    pub fn options(&self) -> &RegressionOptions {
        &self.options
    }

    /// Run every phase; the first phase that neither passes nor skips decides the verdict
    pub async fn run(&self, name: &str) -> Result<RunResult> {
        let date = self.options.date_string();
        let prefix = &self.pipeline.config().regression.env_prefix;
        info!(
            name,
            date = %date,
            binaries = ?self.options.binaries.iter().collect::<Vec<_>>(),
            "starting regression run"
        );

        let new_dir = self.builder.build_all().await?;
        let Some(old_dir) = self.snapshots.fetch(&date).await? else {
            warn!(date = %date, "no snapshot, skipping regression run");
            return Ok(RunResult::skipped());
        };

        for direction in &self.options.directions {
            let (in1, in2) = match direction {
                RegressionDirection::Old => (&old_dir, &new_dir),
                RegressionDirection::New => (&new_dir, &old_dir),
            };
            assemble_binaries(in1, in2, &self.out_dir, &self.options.binaries)?;
            info!(direction = %direction, "running regression phase");

            let opts = TestOptions::new(TestKind::Integration)
                .with_selectors(self.options.selectors.clone())
                .with_workers(self.options.workers)
                .with_run_pattern(self.options.tests.clone())
                .with_env(
                    format!("{}{}", prefix, BIN_DIR_VAR),
                    self.out_dir.display().to_string(),
                )
                .with_env(format!("{}REGTEST_DATE", prefix), date.clone());
            let result = self.pipeline.test(name, &opts).await?;
            if !matches!(result.status, RunStatus::Passed | RunStatus::Skipped) {
                warn!(direction = %direction, "regression phase failed");
                return Ok(result);
            }
        }
        Ok(RunResult::passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 6, 10).unwrap()
    }

    fn env(vars: &[(&str, &str)]) -> RegressionEnv {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RegressionEnv::from_lookup("COUNTDOWN_", |name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let opts = RegressionOptions::resolve(&RegressionConfig::default(), &env(&[]), today()).unwrap();
        assert_eq!(opts.date_string(), "2015-06-09");
        assert_eq!(opts.binaries.len(), 7);
        assert_eq!(
            opts.directions,
            vec![RegressionDirection::Old, RegressionDirection::New]
        );
        assert_eq!(opts.tests, "^TestV23Hello.*");
    }

    #[test]
    fn test_overrides() {
        let vars = env(&[
            ("COUNTDOWN_REGTEST_DAYS", "7"),
            ("COUNTDOWN_REGTEST_BINARIES", "agentd,proxyd"),
            ("COUNTDOWN_REGTEST_DIR", "new"),
            ("COUNTDOWN_REGTEST_TESTS", "^TestV23Mount"),
        ]);
        let opts = RegressionOptions::resolve(&RegressionConfig::default(), &vars, today()).unwrap();
        assert_eq!(opts.date_string(), "2015-06-03");
        assert_eq!(opts.binaries, BinarySet::new(["agentd", "proxyd"]));
        assert_eq!(opts.directions, vec![RegressionDirection::New]);
        assert_eq!(opts.tests, "^TestV23Mount");
    }

    #[test]
    fn test_explicit_date_wins_over_days() {
        let vars = env(&[
            ("COUNTDOWN_REGTEST_DATE", "2015-01-31"),
            ("COUNTDOWN_REGTEST_DAYS", "3"),
            ("COUNTDOWN_REGTEST_BINSET", "agentonly"),
            ("COUNTDOWN_REGTEST_BINARIES", "ignored"),
        ]);
        let opts = RegressionOptions::resolve(&RegressionConfig::default(), &vars, today()).unwrap();
        assert_eq!(opts.date_string(), "2015-01-31");
        assert_eq!(opts.binaries, BinarySet::new(["agentd"]));
    }

    #[test]
    fn test_invalid_overrides() {
        let config = RegressionConfig::default();
        let err = RegressionOptions::resolve(&config, &env(&[("COUNTDOWN_REGTEST_DATE", "June 1")]), today())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "COUNTDOWN_REGTEST_DATE"));

        let err = RegressionOptions::resolve(&config, &env(&[("COUNTDOWN_REGTEST_DIR", "sideways")]), today())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDirection(_)));

        let err = RegressionOptions::resolve(&config, &env(&[("COUNTDOWN_REGTEST_BINSET", "all")]), today())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBinSet(_)));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let vars = env(&[("COUNTDOWN_REGTEST_DIR", "")]);
        assert_eq!(vars.direction, None);
    }
}
