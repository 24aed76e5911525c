//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use countdown_core::config::{load_config, load_config_or_default, validate_config, Config};
use countdown_tasks::{Pipeline, TaskReporterRegistry, TestKind};
use tracing::{debug, info};

use commands::{
    BuildCommand, CompletionsCommand, CoverageCommand, ExclusionsCommand, InitCommand,
    RegressionCommand, TestCommand,
};
use output::ConsoleReporter;

/// Countdown - parallel build, test and coverage driver for Go codebases
#[derive(Debug, Parser)]
#[command(name = "countdown")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (searched for from the working directory by default)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init(InitCommand),

    /// Build every unit
    Build(BuildCommand),

    /// Run unit tests
    Test(TestCommand),

    /// Run unit tests under the data-race detector
    Race(TestCommand),

    /// Run benchmarks
    Bench(TestCommand),

    /// Run integration tests against built binaries
    Integration(TestCommand),

    /// Run tests with coverage and merge the profiles
    Coverage(CoverageCommand),

    /// Run integration tests against binaries mixed from a snapshot and a fresh build
    Regression(RegressionCommand),

    /// List the active exclusion rules
    Exclusions(ExclusionsCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot change to {}", dir.display()))?;
        }

        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Build(ref cmd) => cmd.execute(&self),
            Commands::Test(ref cmd) => cmd.execute(&self, TestKind::Go),
            Commands::Race(ref cmd) => cmd.execute(&self, TestKind::Race),
            Commands::Bench(ref cmd) => cmd.execute(&self, TestKind::Bench),
            Commands::Integration(ref cmd) => cmd.execute(&self, TestKind::Integration),
            Commands::Coverage(ref cmd) => cmd.execute(&self),
            Commands::Regression(ref cmd) => cmd.execute(&self),
            Commands::Exclusions(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }

    /// Whether human-readable progress should be printed
    pub fn interactive(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Load and validate the configuration for `cwd`
    pub fn load_config(&self, cwd: &Path) -> anyhow::Result<Config> {
        let config = match &self.config {
            Some(path) => load_config(path)?,
            None => {
                let (config, path) = load_config_or_default(cwd)?;
                match path {
                    Some(path) => debug!(path = %path.display(), "loaded configuration"),
                    None => info!("no configuration file found, using defaults"),
                }
                config
            }
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// A pipeline over `config` rooted at `cwd`, reporting to tracing and the console
    pub fn pipeline(&self, config: Config, cwd: &Path) -> Pipeline {
        let mut reporters = TaskReporterRegistry::new();
        if self.interactive() {
            reporters.register(ConsoleReporter::new(self.verbose));
        }
        Pipeline::from_config(config, cwd).with_reporter(Arc::new(reporters))
    }
}
