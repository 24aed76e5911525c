//! Where the two provenances of binaries come from

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use countdown_core::{RegressionError, Result};
use tracing::{debug, info, warn};

use crate::executor::run_process;

/// Exit code of the download command when no snapshot exists for a date
pub const NO_SNAPSHOT_EXIT_CODE: i32 = 3;

/// Time allowed for a download or install
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Provides the binaries of a past date
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Directory holding the snapshot of `date` (`YYYY-MM-DD`), `None` when there is none
    async fn fetch(&self, date: &str) -> Result<Option<PathBuf>>;
}

/// Provides freshly built binaries
#[async_trait]
pub trait BinaryBuilder: Send + Sync {
    /// Build everything and return the directory holding the binaries
    async fn build_all(&self) -> Result<PathBuf>;
}

/// Downloads snapshots with a configured command into `<cache_dir>/<date>`.
///
/// `{date}` and `{dir}` in the command are replaced by the date and the
/// download directory. A snapshot already in the cache is reused.
pub struct CommandSnapshotSource {
    cache_dir: PathBuf,
    command: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl CommandSnapshotSource {
    pub fn new(cache_dir: impl Into<PathBuf>, command: Vec<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            command,
            env: HashMap::new(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn snapshot_error(date: &str, reason: impl Into<String>) -> RegressionError {
        RegressionError::Snapshot {
            date: date.to_string(),
            reason: reason.into(),
        }
    }

    fn substitute(&self, date: &str, dir: &Path) -> Vec<String> {
        let dir = dir.display().to_string();
        self.command
            .iter()
            .map(|arg| arg.replace("{date}", date).replace("{dir}", &dir))
            .collect()
    }
}

#[async_trait]
impl SnapshotSource for CommandSnapshotSource {
    async fn fetch(&self, date: &str) -> Result<Option<PathBuf>> {
        let target = self.cache_dir.join(date);
        if target.is_dir() {
            debug!(date, dir = %target.display(), "using cached snapshot");
            return Ok(Some(target));
        }
        if self.command.is_empty() {
            return Err(Self::snapshot_error(date, "no download command configured").into());
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        let download = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.cache_dir)?;
        let args = self.substitute(date, download.path());
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| Self::snapshot_error(date, "no download command configured"))?;

        info!(date, "downloading snapshot");
        let result = run_process(program, rest, &self.env, None, self.timeout).await?;
        if result.timed_out {
            return Err(Self::snapshot_error(date, "download timed out").into());
        }
        match result.exit_code {
            Some(0) => {}
            Some(NO_SNAPSHOT_EXIT_CODE) => {
                warn!(date, "no snapshot for date");
                return Ok(None);
            }
            code => {
                return Err(Self::snapshot_error(
                    date,
                    format!("download exited with {:?}:\n{}", code, result.output),
                )
                .into())
            }
        }

        let downloaded = download.keep();
        if let Err(e) = std::fs::rename(&downloaded, &target) {
            if let Err(cleanup) = std::fs::remove_dir_all(&downloaded) {
                warn!(dir = %downloaded.display(), error = %cleanup, "could not remove partial download");
            }
            return Err(e.into());
        }
        info!(date, dir = %target.display(), "snapshot downloaded");
        Ok(Some(target))
    }
}

/// Installs every unit with `<tool> install <selectors>` into a bin directory
pub struct InstallBuilder {
    tool: Vec<String>,
    selectors: Vec<String>,
    bin_dir: PathBuf,
    env: HashMap<String, String>,
    current_dir: Option<PathBuf>,
}

impl InstallBuilder {
    pub fn new(tool: Vec<String>, selectors: Vec<String>, bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            selectors,
            bin_dir: bin_dir.into(),
            env: HashMap::new(),
            current_dir: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl BinaryBuilder for InstallBuilder {
    async fn build_all(&self) -> Result<PathBuf> {
        let (program, prefix) = self
            .tool
            .split_first()
            .ok_or_else(|| RegressionError::Build("tool command is empty".to_string()))?;
        std::fs::create_dir_all(&self.bin_dir)?;
        let bin_dir = std::fs::canonicalize(&self.bin_dir)?;

        let mut args = prefix.to_vec();
        args.push("install".to_string());
        args.extend(self.selectors.iter().cloned());
        let mut env = self.env.clone();
        env.insert("GOBIN".to_string(), bin_dir.display().to_string());

        info!(selectors = ?self.selectors, bin_dir = %bin_dir.display(), "installing binaries");
        let result = run_process(
            program,
            &args,
            &env,
            self.current_dir.as_deref(),
            COMMAND_TIMEOUT,
        )
        .await?;
        if !result.success() {
            return Err(RegressionError::Build(result.output).into());
        }
        Ok(bin_dir)
    }
}
