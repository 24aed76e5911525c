//! Build, test and coverage pipelines
//!
//! A pipeline resolves the unit universe, narrows it to one test part when
//! asked, filters candidate tests through the exclusion rules, hands one task
//! per unit to the worker pool and writes the xUnit (and Cobertura) reports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use countdown_core::config::Config;
use countdown_core::{ConfigError, Result, RunResult, Unit};
use countdown_report::{write_cobertura, write_report, TestSuite};
use tracing::{debug, info, warn};

use crate::aggregator::{AggregateResult, Aggregator};
use crate::enumerate::{FuncMatcher, GoList, TestFuncScanner, TestNameSource, UnitSource};
use crate::exclusion::{ExclusionRules, Platform};
use crate::executor::{run_process, Invocation, UnitExecutor};
use crate::reporter::{TaskReporter, TracingReporter};
use crate::scheduler::{Dispatch, WorkerPool};
use crate::task::{ExecutionOutcome, Task};

/// Suite name of the report written when pre-building dependencies fails
pub const PREBUILD_SUITE: &str = "BuildTestDependencies";

/// Name of the variable pointing integration tests at the binaries under test
pub const BIN_DIR_VAR: &str = "BIN_DIR";

/// Flavor of a test run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TestKind {
    /// Plain unit tests
    #[default]
    Go,
    /// Unit tests under the data-race detector
    Race,
    /// Benchmarks only
    Bench,
    /// End-to-end tests driving built binaries
    Integration,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "test",
            Self::Race => "race",
            Self::Bench => "bench",
            Self::Integration => "integration",
        }
    }

    /// Base of the `[<base> - <os>,<arch>]` case-name suffix
    fn suffix_base(&self) -> Option<&'static str> {
        match self {
            Self::Go => Some("GoTest"),
            Self::Race => Some("GoRace"),
            Self::Bench => None,
            Self::Integration => Some("V23Test"),
        }
    }
}

/// Options of a build run
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Requested selectors; empty means the configured defaults
    pub selectors: Vec<String>,
    pub workers: Option<usize>,
    /// Overrides `build.bin_dir`
    pub bin_dir: Option<PathBuf>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(bin_dir.into());
        self
    }
}

/// Options of a test run
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub kind: TestKind,
    /// Requested selectors; empty means the configured defaults
    pub selectors: Vec<String>,
    /// Index into `test_parts[<name>]`
    pub part: Option<usize>,
    pub workers: Option<usize>,
    /// Overrides the kind's default `-run` pattern
    pub run_pattern: Option<String>,
    /// Extra environment for every invocation
    pub env: HashMap<String, String>,
}

impl TestOptions {
    pub fn new(kind: TestKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_part(mut self, part: Option<usize>) -> Self {
        self.part = part;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_run_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.run_pattern = Some(pattern.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Options of a coverage run
#[derive(Debug, Clone, Default)]
pub struct CoverageOptions {
    /// Requested selectors; empty means the configured defaults
    pub selectors: Vec<String>,
    pub workers: Option<usize>,
}

impl CoverageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }
}

/// Per-kind invocation settings resolved from the configuration
struct TestSettings {
    timeout: Duration,
    args: Vec<String>,
    non_test_args: Vec<String>,
    run_pattern: Option<String>,
    rules: ExclusionRules,
    names: Arc<dyn TestNameSource>,
    env: HashMap<String, String>,
}

/// Runs build, test and coverage passes over the configured units
pub struct Pipeline {
    config: Config,
    platform: Platform,
    units: Arc<dyn UnitSource>,
    test_names: Arc<dyn TestNameSource>,
    integration_names: Arc<dyn TestNameSource>,
    reporter: Arc<dyn TaskReporter>,
    current_dir: Option<PathBuf>,
}

impl Pipeline {
    /// A pipeline using `test_names` for every kind of test run
    pub fn new(
        config: Config,
        units: Arc<dyn UnitSource>,
        test_names: Arc<dyn TestNameSource>,
    ) -> Self {
        Self {
            config,
            platform: Platform::current(),
            units,
            integration_names: test_names.clone(),
            test_names,
            reporter: Arc::new(TracingReporter),
            current_dir: None,
        }
    }

    /// A pipeline enumerating with `<tool> list` and scanning `*_test.go` files
    pub fn from_config(config: Config, dir: &Path) -> Self {
        let list = Arc::new(
            GoList::new(config.tool.command.clone())
                .with_env(config.tool.env.clone())
                .with_current_dir(dir),
        );
        let test_names = Arc::new(TestFuncScanner::new(list.clone(), FuncMatcher::GoTest));
        let integration_names = Arc::new(TestFuncScanner::new(
            list.clone(),
            FuncMatcher::Integration {
                prefix: config.integration.func_prefix.clone(),
                param_type: config.integration.param_type.clone(),
            },
        ));
        Self::new(config, list, test_names)
            .with_integration_names(integration_names)
            .with_current_dir(dir)
    }

    pub fn with_integration_names(mut self, names: Arc<dyn TestNameSource>) -> Self {
        self.integration_names = names;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Directory the tool runs in; relative configured paths resolve against it
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Resolve `path` against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.current_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.resolve(&self.config.reports.dir)
    }

    /// Exclusion rules of a test run; race runs append the race-only rules
    pub fn exclusion_rules(&self, race: bool) -> Result<ExclusionRules> {
        let rules = ExclusionRules::from_config(&self.config.exclusions, &self.platform)?;
        if !race {
            return Ok(rules);
        }
        let race_rules = ExclusionRules::from_config(&self.config.race_exclusions, &self.platform)?;
        Ok(rules.chain(&race_rules))
    }

    /// Expand `requested`, refusing any unit outside the configured universe.
    ///
    /// Nothing requested means the whole universe.
    pub async fn validate_against_defaults(&self, requested: &[String]) -> Result<Vec<Unit>> {
        let defaults = &self.config.units.defaults;
        let allowed = self.units.list_units(defaults).await?;
        if requested.is_empty() {
            return Ok(allowed);
        }

        let allowed: HashSet<Unit> = allowed.into_iter().collect();
        let units = self.units.list_units(requested).await?;
        if let Some(unit) = units.iter().find(|u| !allowed.contains(*u)) {
            return Err(ConfigError::UnitNotAllowed {
                unit: unit.to_string(),
                defaults: defaults.clone(),
            }
            .into());
        }
        Ok(units)
    }

    /// Narrow `units` to one part of the `name` run.
    ///
    /// With k configured groups, part `i < k` keeps the units of group `i`
    /// and part `k` keeps every unit no group names.
    pub async fn select_part(
        &self,
        name: &str,
        part: Option<usize>,
        units: Vec<Unit>,
    ) -> Result<Vec<Unit>> {
        let Some(index) = part else {
            return Ok(units);
        };
        let groups = match self.config.test_parts.get(name) {
            Some(groups) if !groups.is_empty() => groups,
            _ => return Ok(units),
        };

        let selected = if index < groups.len() {
            let listed: HashSet<Unit> = self
                .units
                .list_units(&groups[index..=index])
                .await?
                .into_iter()
                .collect();
            units.into_iter().filter(|u| listed.contains(u)).collect()
        } else if index == groups.len() {
            let listed: HashSet<Unit> = self.units.list_units(groups).await?.into_iter().collect();
            units.into_iter().filter(|u| !listed.contains(u)).collect::<Vec<_>>()
        } else {
            return Err(ConfigError::InvalidPart {
                index,
                last: groups.len(),
            }
            .into());
        };
        debug!(name, part = index, units = selected.len(), "selected test part");
        Ok(selected)
    }

    fn pool(&self, workers: Option<usize>) -> Result<WorkerPool> {
        Ok(WorkerPool::new(workers.or(self.config.tool.workers))
            .with_stagger(self.config.tool.stagger_duration()?))
    }

    fn executor(
        &self,
        invocation: Invocation,
        timeout: Duration,
        env: HashMap<String, String>,
    ) -> UnitExecutor {
        let mut executor = UnitExecutor::new(self.config.tool.command.clone(), invocation, timeout)
            .with_env(self.config.tool.env.clone())
            .with_env(env)
            .with_reporter(self.reporter.clone());
        if let Some(dir) = &self.current_dir {
            executor = executor.with_current_dir(dir);
        }
        executor
    }

    async fn dispatch(
        &self,
        workers: Option<usize>,
        tasks: Vec<Task>,
        synthetic: Vec<ExecutionOutcome>,
        executor: UnitExecutor,
    ) -> Result<Vec<ExecutionOutcome>> {
        Dispatch::new(self.pool(workers)?)
            .with_reporter(self.reporter.clone())
            .run(tasks, synthetic, Arc::new(executor))
            .await
    }

    /// Fold outcomes into suites and write the reports of run `name`
    fn finish(
        &self,
        name: &str,
        mut aggregator: Aggregator,
        outcomes: Vec<ExecutionOutcome>,
    ) -> Result<AggregateResult> {
        for outcome in outcomes {
            aggregator.add(outcome)?;
        }
        let result = aggregator.finish();

        let dir = self.report_dir();
        write_report(&dir, name, &result.suites)?;
        if let Some(profile) = &result.coverage {
            write_cobertura(&dir, name, profile)?;
        }

        info!(
            name,
            suites = result.suites.len(),
            failed = result.failed_units.len(),
            "run finished"
        );
        Ok(result)
    }

    /// Run the configured pre-build command over `units`; returns its output on failure
    async fn prebuild(&self, units: &[Unit], env: &HashMap<String, String>) -> Result<Option<String>> {
        let Some((program, prefix)) = self.config.test.prebuild.split_first() else {
            return Ok(None);
        };
        if units.is_empty() {
            return Ok(None);
        }

        let mut args = prefix.to_vec();
        args.extend(units.iter().map(Unit::to_string));
        let mut full_env = self.config.tool.env.clone();
        full_env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!(units = units.len(), "building test dependencies");
        let result = run_process(
            program,
            &args,
            &full_env,
            self.current_dir.as_deref(),
            self.config.build.timeout_duration()?,
        )
        .await?;
        if result.success() {
            return Ok(None);
        }
        warn!("building test dependencies failed\n{}", result.output);
        Ok(Some(result.output))
    }

    /// Record a dependency build failure as the only suite of run `name`
    fn write_prebuild_failure(&self, name: &str, case_name: &str, output: String) -> Result<RunResult> {
        let suite = TestSuite::with_failure(
            PREBUILD_SUITE,
            case_name,
            "dependencies build failure",
            output,
            Duration::ZERO,
        );
        write_report(&self.report_dir(), name, &[suite])?;
        Ok(RunResult::failed())
    }

    /// Build every unit into the bin directory
    pub async fn build(&self, name: &str, opts: &BuildOptions) -> Result<RunResult> {
        let units = self.validate_against_defaults(&opts.selectors).await?;
        let bin_dir = self.resolve(opts.bin_dir.as_deref().unwrap_or(&self.config.build.bin_dir));
        std::fs::create_dir_all(&bin_dir)?;
        info!(name, units = units.len(), bin_dir = %bin_dir.display(), "building units");

        let executor = self.executor(
            Invocation::Build {
                bin_dir,
                args: self.config.build.args.clone(),
            },
            self.config.build.timeout_duration()?,
            HashMap::new(),
        );
        let tasks = units.into_iter().map(Task::new).collect();
        let outcomes = self.dispatch(opts.workers, tasks, Vec::new(), executor).await?;
        Ok(self.finish(name, Aggregator::build(), outcomes)?.run_result())
    }

    fn test_settings(&self, opts: &TestOptions) -> Result<TestSettings> {
        let config = &self.config;
        let mut env = HashMap::new();
        let settings = match opts.kind {
            TestKind::Go => TestSettings {
                timeout: config.test.timeout_duration()?,
                args: config.test.args.clone(),
                non_test_args: Vec::new(),
                run_pattern: None,
                rules: self.exclusion_rules(false)?,
                names: self.test_names.clone(),
                env: HashMap::new(),
            },
            TestKind::Race => TestSettings {
                timeout: config.race.timeout_duration()?,
                args: [config.test.args.as_slice(), config.race.args.as_slice()].concat(),
                non_test_args: Vec::new(),
                run_pattern: None,
                rules: self.exclusion_rules(true)?,
                names: self.test_names.clone(),
                env: HashMap::new(),
            },
            TestKind::Bench => TestSettings {
                timeout: config.bench.timeout_duration()?,
                args: config.bench.args.clone(),
                non_test_args: Vec::new(),
                run_pattern: None,
                rules: ExclusionRules::default(),
                names: self.test_names.clone(),
                env: HashMap::new(),
            },
            TestKind::Integration => {
                let bin_dir = self.resolve(&config.build.bin_dir);
                env.insert(
                    format!("{}{}", config.regression.env_prefix, BIN_DIR_VAR),
                    bin_dir.display().to_string(),
                );
                TestSettings {
                    timeout: config.integration.timeout_duration()?,
                    args: config.test.args.clone(),
                    non_test_args: config.integration.non_test_args.clone(),
                    run_pattern: Some(config.integration.run_pattern.clone()),
                    rules: ExclusionRules::default(),
                    names: self.integration_names.clone(),
                    env: HashMap::new(),
                }
            }
        };
        env.extend(opts.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(TestSettings {
            run_pattern: opts.run_pattern.clone().or(settings.run_pattern),
            env,
            ..settings
        })
    }

    /// Turn units into tasks; units whose every test is excluded become synthetic outcomes
    async fn plan(
        &self,
        units: Vec<Unit>,
        names: &dyn TestNameSource,
        rules: &ExclusionRules,
    ) -> Result<(Vec<Task>, Vec<ExecutionOutcome>)> {
        let mut tasks = Vec::new();
        let mut synthetic = Vec::new();
        for unit in units {
            let candidates = names.candidate_names(&unit).await?;
            if candidates.is_empty() {
                debug!(unit = %unit, "no tests");
                continue;
            }
            let filtered = rules.filter(&unit, &candidates);
            if !filtered.include {
                synthetic.push(ExecutionOutcome::excluded(unit, filtered.excluded));
                continue;
            }
            match filtered.names_to_run {
                Some(names) => tasks.extend(Task::restricted(unit, names, filtered.excluded)),
                None => tasks.push(Task::new(unit)),
            }
        }
        Ok((tasks, synthetic))
    }

    fn suffix(&self, kind: TestKind) -> Option<String> {
        if !self.config.test.suffix {
            return None;
        }
        kind.suffix_base().map(|base| self.platform.suffix(base))
    }

    /// Run the tests of every unit
    pub async fn test(&self, name: &str, opts: &TestOptions) -> Result<RunResult> {
        let settings = self.test_settings(opts)?;
        let units = self.validate_against_defaults(&opts.selectors).await?;
        let units = self.select_part(name, opts.part, units).await?;
        let suffix = self.suffix(opts.kind);
        info!(name, kind = opts.kind.as_str(), units = units.len(), "running tests");

        if let Some(output) = self.prebuild(&units, &settings.env).await? {
            let case_name = match &suffix {
                Some(suffix) => format!("{} {}", name, suffix),
                None => name.to_string(),
            };
            return self.write_prebuild_failure(name, &case_name, output);
        }

        let (tasks, synthetic) = self
            .plan(units, settings.names.as_ref(), &settings.rules)
            .await?;
        let executor = self.executor(
            Invocation::Test {
                args: settings.args,
                non_test_args: settings.non_test_args,
                run_pattern: settings.run_pattern,
            },
            settings.timeout,
            settings.env,
        );
        let outcomes = self.dispatch(opts.workers, tasks, synthetic, executor).await?;
        let aggregator = Aggregator::test().with_suffix(suffix);
        Ok(self.finish(name, aggregator, outcomes)?.run_result())
    }

    /// Run the tests of every unit with coverage and merge the profiles
    pub async fn coverage(&self, name: &str, opts: &CoverageOptions) -> Result<RunResult> {
        let units = self.validate_against_defaults(&opts.selectors).await?;
        info!(name, units = units.len(), "collecting coverage");

        if let Some(output) = self.prebuild(&units, &HashMap::new()).await? {
            return self.write_prebuild_failure(name, "TestCoverage", output);
        }

        let executor = self.executor(
            Invocation::Coverage {
                args: self.config.coverage.args.clone(),
            },
            self.config.coverage.timeout_duration()?,
            HashMap::new(),
        );
        let tasks = units.into_iter().map(Task::new).collect();
        let outcomes = self.dispatch(opts.workers, tasks, Vec::new(), executor).await?;
        Ok(self.finish(name, Aggregator::coverage(), outcomes)?.run_result())
    }
}
