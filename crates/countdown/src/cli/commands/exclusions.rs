//! Exclusions command

use clap::Args;
use countdown_tasks::Pipeline;
use tracing::info;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// List the exclusion rules active on this platform
#[derive(Debug, Args)]
pub struct ExclusionsCommand {
    /// Include the rules that only apply to race runs
    #[arg(long)]
    pub race: bool,
}

impl ExclusionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let cwd = std::env::current_dir()?;
        let config = cli.load_config(&cwd)?;
        info!(race = self.race, "executing exclusions command");

        let pipeline = Pipeline::from_config(config, &cwd);
        let rules = pipeline.exclusion_rules(self.race)?;
        let active = rules.describe_active();

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&active)?);
            return Ok(exit_codes::SUCCESS);
        }
        if cli.quiet {
            return Ok(exit_codes::SUCCESS);
        }

        let platform = pipeline.platform();
        println!(
            "{}",
            output::header(&format!(
                "Active exclusions on {}/{} ({} of {} rules)",
                platform.os,
                platform.arch,
                active.len(),
                rules.len()
            ))
        );
        for rule in &active {
            println!("  {}", rule);
        }
        Ok(exit_codes::SUCCESS)
    }
}
