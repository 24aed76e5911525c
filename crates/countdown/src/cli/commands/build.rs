//! Build command

use std::path::PathBuf;

use clap::Args;
use countdown_tasks::BuildOptions;
use tracing::info;

use super::{print_run_header, runtime, RunArgs};
use crate::cli::{output, Cli};
use crate::exit_codes;

/// Build every unit into the bin directory
#[derive(Debug, Args)]
pub struct BuildCommand {
    #[command(flatten)]
    pub run: RunArgs,

    /// Directory receiving the binaries (overrides `build.bin_dir`)
    #[arg(long)]
    pub bin_dir: Option<PathBuf>,
}

impl BuildCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        runtime()?.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let mut config = cli.load_config(&cwd)?;
        if let Some(ref dir) = self.run.report_dir {
            config.reports.dir = dir.clone();
        }

        let name = self.run.name_or("build");
        info!(name = %name, units = ?self.run.units, "executing build command");
        print_run_header(cli, "Building units...", &name, &self.run);

        let mut opts = BuildOptions::new()
            .with_selectors(self.run.units.clone())
            .with_workers(self.run.workers);
        if let Some(ref dir) = self.bin_dir {
            opts = opts.with_bin_dir(dir);
        }

        let result = cli.pipeline(config, &cwd).build(&name, &opts).await?;
        output::print_run_result(cli, &name, &result)?;
        Ok(exit_codes::for_status(result.status))
    }
}
