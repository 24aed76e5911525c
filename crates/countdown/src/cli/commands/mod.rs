//! CLI commands

mod build;
mod completions;
mod coverage;
mod exclusions;
mod init;
mod regression;
mod test;

pub use build::BuildCommand;
pub use completions::CompletionsCommand;
pub use coverage::CoverageCommand;
pub use exclusions::ExclusionsCommand;
pub use init::InitCommand;
pub use regression::RegressionCommand;
pub use test::TestCommand;

use std::path::PathBuf;

use clap::Args;

use crate::cli::{output, Cli};

/// Arguments shared by every run command
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Units to run (defaults to the configured universe)
    pub units: Vec<String>,

    /// Number of parallel workers (defaults to the number of CPUs)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Report name (`tests_<name>.xml`)
    #[arg(long)]
    pub name: Option<String>,

    /// Directory receiving the reports
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Report name, falling back to `default`
    pub fn name_or(&self, default: &str) -> String {
        self.name.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Print what is about to run
fn print_run_header(cli: &Cli, title: &str, name: &str, args: &RunArgs) {
    if !cli.interactive() {
        return;
    }
    println!();
    println!("{}", output::header(title));
    println!("{}", output::key_value("Name", name));
    if !args.units.is_empty() {
        println!("{}", output::key_value("Units", &args.units.join(" ")));
    }
    if let Some(workers) = args.workers {
        println!("{}", output::key_value("Workers", &workers.to_string()));
    }
    if let Some(ref dir) = args.report_dir {
        println!(
            "{}",
            output::key_value(
                "Reports",
                &output::path_style().apply_to(dir.display()).to_string()
            )
        );
    }
    println!();
}

/// Create the runtime the async pipelines run on
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}
