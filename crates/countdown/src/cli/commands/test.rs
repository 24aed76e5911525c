//! Test commands: unit tests, race, benchmarks and integration tests

use clap::Args;
use countdown_tasks::{TestKind, TestOptions};
use tracing::info;

use super::{print_run_header, runtime, RunArgs};
use crate::cli::{output, Cli};
use crate::exit_codes;

/// Run the tests of every unit
#[derive(Debug, Args)]
pub struct TestCommand {
    #[command(flatten)]
    pub run: RunArgs,

    /// Run only this part of the configured `test_parts` split
    #[arg(short = 'p', long, env = "COUNTDOWN_PART")]
    pub part: Option<usize>,

    /// Override the `-run` pattern
    #[arg(long = "run")]
    pub run_pattern: Option<String>,
}

fn title(kind: TestKind) -> &'static str {
    match kind {
        TestKind::Go => "Running tests...",
        TestKind::Race => "Running race tests...",
        TestKind::Bench => "Running benchmarks...",
        TestKind::Integration => "Running integration tests...",
    }
}

impl TestCommand {
    pub fn execute(&self, cli: &Cli, kind: TestKind) -> anyhow::Result<i32> {
        runtime()?.block_on(self.execute_async(cli, kind))
    }

    async fn execute_async(&self, cli: &Cli, kind: TestKind) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let mut config = cli.load_config(&cwd)?;
        if let Some(ref dir) = self.run.report_dir {
            config.reports.dir = dir.clone();
        }

        let name = self.run.name_or(kind.as_str());
        info!(name = %name, kind = kind.as_str(), part = ?self.part, "executing test command");
        print_run_header(cli, title(kind), &name, &self.run);

        let mut opts = TestOptions::new(kind)
            .with_selectors(self.run.units.clone())
            .with_part(self.part)
            .with_workers(self.run.workers);
        if let Some(ref pattern) = self.run_pattern {
            opts = opts.with_run_pattern(pattern.clone());
        }

        let result = cli.pipeline(config, &cwd).test(&name, &opts).await?;
        output::print_run_result(cli, &name, &result)?;
        Ok(exit_codes::for_status(result.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_parse_part_and_units() {
        let cli = Cli::parse_from(["countdown", "race", "-p", "2", "-j", "4", "v.io/x/ref/..."]);
        match cli.command {
            Commands::Race(cmd) => {
                assert_eq!(cmd.part, Some(2));
                assert_eq!(cmd.run.workers, Some(4));
                assert_eq!(cmd.run.units, vec!["v.io/x/ref/...".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
