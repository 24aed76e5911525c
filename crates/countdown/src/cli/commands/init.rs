//! Init command

use std::path::PathBuf;

use clap::Args;
use countdown_core::config::defaults::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};
use tracing::info;

use crate::cli::{output, Cli};
use crate::exit_codes;

/// Write a default configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(force = self.force, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        if !cli.quiet {
            output::success(&format!(
                "Created {}",
                output::path_style().apply_to(config_path.display())
            ));
        }
        Ok(exit_codes::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use countdown_core::config::load_config;
    use tempfile::TempDir;

    #[test]
    fn test_written_template_loads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("countdown.toml");
        let cli = Cli::parse_from(["countdown", "--quiet", "init"]);
        let cmd = InitCommand {
            force: false,
            output: Some(path.clone()),
        };

        assert_eq!(cmd.execute(&cli).unwrap(), exit_codes::SUCCESS);
        let config = load_config(&path).unwrap();
        assert_eq!(config.tool.command, vec!["go".to_string()]);

        assert!(cmd.execute(&cli).is_err());
    }
}
