//! Regression command

use std::sync::Arc;

use clap::Args;
use countdown_tasks::{
    CommandSnapshotSource, InstallBuilder, RegressionEnv, RegressionOptions, RegressionWorkflow,
};
use tracing::info;

use super::{runtime, RunArgs};
use crate::cli::{output, Cli};
use crate::exit_codes;

/// Run integration tests against binaries mixed from a snapshot and a fresh build
///
/// Every option can also be set through `<prefix>REGTEST_*` environment
/// variables (`DATE`, `DAYS`, `BINSET`, `BINARIES`, `DIR`, `TESTS`); flags win.
#[derive(Debug, Args)]
pub struct RegressionCommand {
    #[command(flatten)]
    pub run: RunArgs,

    /// Snapshot date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Snapshot age in days, used when no date is given
    #[arg(long, conflicts_with = "date")]
    pub days: Option<u32>,

    /// Named binary set to hold out
    #[arg(long)]
    pub binset: Option<String>,

    /// Comma-separated binaries to hold out
    #[arg(long, conflicts_with = "binset")]
    pub binaries: Option<String>,

    /// Run only one direction (`old` or `new`)
    #[arg(long)]
    pub direction: Option<String>,

    /// `-run` pattern of the tests
    #[arg(long)]
    pub tests: Option<String>,
}

impl RegressionCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        runtime()?.block_on(self.execute_async(cli))
    }

    /// Layer the flags over the environment overrides
    fn apply_flags(&self, env: &mut RegressionEnv) {
        if let Some(ref date) = self.date {
            env.date = Some(date.clone());
        }
        if let Some(days) = self.days {
            env.date = None;
            env.days = Some(days.to_string());
        }
        if let Some(ref binset) = self.binset {
            env.binset = Some(binset.clone());
        }
        if let Some(ref binaries) = self.binaries {
            env.binset = None;
            env.binaries = Some(binaries.clone());
        }
        if let Some(ref direction) = self.direction {
            env.direction = Some(direction.clone());
        }
        if let Some(ref tests) = self.tests {
            env.tests = Some(tests.clone());
        }
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let mut config = cli.load_config(&cwd)?;
        if let Some(ref dir) = self.run.report_dir {
            config.reports.dir = dir.clone();
        }

        let mut env = RegressionEnv::from_env(&config.regression.env_prefix);
        self.apply_flags(&mut env);
        let today = chrono::Local::now().date_naive();
        let options = RegressionOptions::resolve(&config.regression, &env, today)?
            .with_selectors(self.run.units.clone())
            .with_workers(self.run.workers);

        let name = self.run.name_or("regression");
        info!(
            name = %name,
            date = %options.date_string(),
            directions = ?options.directions,
            "executing regression command"
        );
        if cli.interactive() {
            println!();
            println!("{}", output::header("Running regression tests..."));
            println!("{}", output::key_value("Name", &name));
            println!("{}", output::key_value("Snapshot", &options.date_string()));
            println!(
                "{}",
                output::key_value(
                    "Held out",
                    &options.binaries.iter().collect::<Vec<_>>().join(", ")
                )
            );
            println!(
                "{}",
                output::key_value(
                    "Directions",
                    &options
                        .directions
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            );
            println!();
        }

        let install_selectors = if self.run.units.is_empty() {
            config.units.defaults.clone()
        } else {
            self.run.units.clone()
        };
        let regression = config.regression.clone();
        let tool = config.tool.clone();

        let pipeline = Arc::new(cli.pipeline(config, &cwd));
        let builder = InstallBuilder::new(
            tool.command,
            install_selectors,
            pipeline.resolve(&regression.new_bin_dir),
        )
        .with_env(tool.env.clone())
        .with_current_dir(&cwd);
        let snapshots = CommandSnapshotSource::new(
            pipeline.resolve(&regression.work_dir),
            regression.download_command,
        )
        .with_env(tool.env);

        let workflow =
            RegressionWorkflow::new(pipeline, Arc::new(builder), Arc::new(snapshots), options);
        let result = workflow.run(&name).await?;
        output::print_run_result(cli, &name, &result)?;
        Ok(exit_codes::for_status(result.status))
    }
}
