//! Coverage command

use clap::Args;
use countdown_report::report_path;
use countdown_tasks::CoverageOptions;
use tracing::info;

use super::{print_run_header, runtime, RunArgs};
use crate::cli::{output, Cli};
use crate::exit_codes;

/// Run the tests of every unit with coverage enabled
#[derive(Debug, Args)]
pub struct CoverageCommand {
    #[command(flatten)]
    pub run: RunArgs,
}

impl CoverageCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        runtime()?.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let mut config = cli.load_config(&cwd)?;
        if let Some(ref dir) = self.run.report_dir {
            config.reports.dir = dir.clone();
        }

        let name = self.run.name_or("coverage");
        info!(name = %name, units = ?self.run.units, "executing coverage command");
        print_run_header(cli, "Collecting coverage...", &name, &self.run);

        let opts = CoverageOptions::new()
            .with_selectors(self.run.units.clone())
            .with_workers(self.run.workers);
        let pipeline = cli.pipeline(config, &cwd);
        let result = pipeline.coverage(&name, &opts).await?;

        if cli.interactive() {
            let path = report_path(&pipeline.report_dir(), "cobertura", &name);
            if path.exists() {
                output::info(&format!(
                    "Coverage report: {}",
                    output::path_style().apply_to(path.display())
                ));
            }
        }
        output::print_run_result(cli, &name, &result)?;
        Ok(exit_codes::for_status(result.status))
    }
}
