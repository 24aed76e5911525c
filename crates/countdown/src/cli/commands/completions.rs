//! Shell completions

use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, generate_to, Shell};
use tracing::info;

use crate::cli::{output, Cli};
use crate::exit_codes;

const BIN_NAME: &str = "countdown";

/// Generate shell completions
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the completion script into this directory instead of stdout
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(shell = %self.shell, "executing completions command");
        let mut cmd = Cli::command();

        match self.dir {
            Some(ref dir) => {
                std::fs::create_dir_all(dir)?;
                let path = generate_to(self.shell, &mut cmd, BIN_NAME, dir)?;
                if !cli.quiet {
                    output::success(&format!(
                        "Completions written to {}",
                        output::path_style().apply_to(path.display())
                    ));
                }
            }
            None => generate(self.shell, &mut cmd, BIN_NAME, &mut io::stdout()),
        }
        Ok(exit_codes::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_completions_written_to_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("completions");
        let cli = Cli::parse_from(["countdown", "--quiet", "completions", "bash"]);
        let cmd = CompletionsCommand {
            shell: Shell::Bash,
            dir: Some(dir.clone()),
        };

        assert_eq!(cmd.execute(&cli).unwrap(), exit_codes::SUCCESS);
        let script = std::fs::read_to_string(dir.join("countdown.bash")).unwrap();
        assert!(script.contains("regression"));
    }
}
