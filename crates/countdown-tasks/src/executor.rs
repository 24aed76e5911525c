//! Running the external tool for one unit

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use countdown_core::config::format_duration;
use countdown_core::{ExecutionError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use crate::classifier::{classify, FailureKind, ProcessResult};
use crate::reporter::{TaskEvent, TaskReporter, TracingReporter};
use crate::task::{CoverageArtifact, ExecutionOutcome, OutcomeStatus, Task};

/// Something that turns a task into an outcome
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one task; unit failures are outcomes, only orchestration errors are `Err`
    async fn execute(&self, task: Task) -> Result<ExecutionOutcome>;
}

/// How the tool is invoked for each unit
#[derive(Debug, Clone)]
pub enum Invocation {
    /// `build -o <bin_dir>/<basename> <args> <unit>`
    Build { bin_dir: PathBuf, args: Vec<String> },
    /// `test -timeout <t> -v <args> [-run <alt>] <unit> <non_test_args>`
    Test {
        args: Vec<String>,
        non_test_args: Vec<String>,
        /// `-run` pattern used when the task does not name specific tests
        run_pattern: Option<String>,
    },
    /// `test -cover -coverprofile <file> -timeout <t> -v <args> <unit>`
    Coverage { args: Vec<String> },
}

impl Invocation {
    fn is_build(&self) -> bool {
        matches!(self, Self::Build { .. })
    }
}

/// Executes one subprocess per task with a hard timeout
pub struct UnitExecutor {
    tool: Vec<String>,
    invocation: Invocation,
    timeout: Duration,
    env: HashMap<String, String>,
    current_dir: Option<PathBuf>,
    reporter: Arc<dyn TaskReporter>,
}

impl UnitExecutor {
    /// `tool` is the command prefix, e.g. `["go"]`
    pub fn new(tool: Vec<String>, invocation: Invocation, timeout: Duration) -> Self {
        Self {
            tool,
            invocation,
            timeout,
            env: HashMap::new(),
            current_dir: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Arguments following the tool prefix
    pub fn command_args(&self, task: &Task, coverage_file: Option<&Path>) -> Vec<String> {
        let timeout = format_duration(self.timeout);
        let unit = task.unit().to_string();
        let mut args: Vec<String> = Vec::new();

        match &self.invocation {
            Invocation::Build {
                bin_dir,
                args: extra,
            } => {
                args.push("build".to_string());
                args.push("-o".to_string());
                args.push(bin_dir.join(task.unit().basename()).display().to_string());
                args.extend(extra.iter().cloned());
                args.push(unit);
            }
            Invocation::Test {
                args: extra,
                non_test_args,
                run_pattern,
            } => {
                args.extend(["test", "-timeout", timeout.as_str(), "-v"].map(String::from));
                args.extend(extra.iter().cloned());
                let run = match task.specific_names() {
                    Some(names) => Some(names.join("|")),
                    None => run_pattern.clone(),
                };
                if let Some(run) = run {
                    args.push("-run".to_string());
                    args.push(run);
                }
                args.push(unit);
                args.extend(non_test_args.iter().cloned());
            }
            Invocation::Coverage { args: extra } => {
                args.extend(["test", "-cover", "-coverprofile"].map(String::from));
                args.push(
                    coverage_file
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                );
                args.extend(["-timeout", timeout.as_str(), "-v"].map(String::from));
                args.extend(extra.iter().cloned());
                args.push(unit);
            }
        }
        args
    }
}

#[async_trait]
impl Executor for UnitExecutor {
    async fn execute(&self, task: Task) -> Result<ExecutionOutcome> {
        let coverage = match self.invocation {
            Invocation::Coverage { .. } => Some(CoverageArtifact::create(task.unit())?),
            _ => None,
        };
        let args = self.command_args(&task, coverage.as_ref().map(|c| c.path()));
        let (program, prefix) = self.tool.split_first().ok_or_else(|| ExecutionError::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty tool command"),
        })?;
        let mut full_args = prefix.to_vec();
        full_args.extend(args);

        self.reporter.report(&TaskEvent::Started {
            unit: task.unit().clone(),
            command: format!("{} {}", program, full_args.join(" ")),
        });

        let start = Instant::now();
        let process = run_process(
            program,
            &full_args,
            &self.env,
            self.current_dir.as_deref(),
            self.timeout,
        )
        .await?;
        let duration = start.elapsed();

        let status = if process.success() {
            OutcomeStatus::Passed
        } else if self.invocation.is_build() && !process.timed_out {
            OutcomeStatus::BuildFailed
        } else {
            match classify(&process, task.unit()) {
                FailureKind::BuildFailed => OutcomeStatus::BuildFailed,
                FailureKind::TestFailed => OutcomeStatus::TestFailed,
                FailureKind::TimedOut => OutcomeStatus::TimedOut,
            }
        };

        self.reporter.report(&TaskEvent::Finished {
            unit: task.unit().clone(),
            status,
            duration,
        });

        Ok(ExecutionOutcome {
            unit: task.unit().clone(),
            status,
            output: process.output,
            duration,
            coverage,
            excluded_names: task.excluded_names().to_vec(),
        })
    }
}

/// Spawn `program`, merge its stdout and stderr line by line, and kill it
/// together with everything it started once `limit` elapses.
pub async fn run_process(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
    current_dir: Option<&Path>,
    limit: Duration,
) -> std::result::Result<ProcessResult, ExecutionError> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!(command = %command_line, timeout_ms = limit.as_millis() as u64, "spawning");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
        command: command_line.clone(),
        source,
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut output = String::new();
    let waited = tokio::time::timeout(limit, async {
        collect_output(stdout, stderr, &mut output).await?;
        child.wait().await
    })
    .await;

    let (exit_code, timed_out) = match waited {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(source)) => {
            return Err(ExecutionError::Wait {
                command: command_line,
                source,
            })
        }
        Err(_) => {
            warn!(command = %command_line, "timed out, killing process group");
            kill_tree(&mut child, &command_line).await;
            (None, true)
        }
    };

    Ok(ProcessResult {
        exit_code,
        output,
        timed_out,
    })
}

/// Kill `child` and its process group, then reap it
async fn kill_tree(child: &mut Child, command: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // the child leads its own group, see `process_group(0)`
        let pgid = pid as libc::pid_t;
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(command, error = %err, "failed to kill process group");
            }
        }
    }
    if let Err(err) = child.kill().await {
        warn!(command, error = %err, "failed to kill process");
    }
}

async fn collect_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    output: &mut String,
) -> std::io::Result<()> {
    let mut out = stdout.map(|s| BufReader::new(s).split(b'\n'));
    let mut err = stderr.map(|s| BufReader::new(s).split(b'\n'));

    loop {
        tokio::select! {
            segment = next_segment(&mut out), if out.is_some() => match segment? {
                Some(bytes) => push_line(output, &bytes),
                None => out = None,
            },
            segment = next_segment(&mut err), if err.is_some() => match segment? {
                Some(bytes) => push_line(output, &bytes),
                None => err = None,
            },
            else => break,
        }
    }
    Ok(())
}

async fn next_segment<R: AsyncBufRead + Unpin>(
    lines: &mut Option<Split<R>>,
) -> std::io::Result<Option<Vec<u8>>> {
    match lines {
        Some(lines) => lines.next_segment().await,
        None => Ok(None),
    }
}

fn push_line(output: &mut String, bytes: &[u8]) {
    output.push_str(&String::from_utf8_lossy(bytes));
    output.push('\n');
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use countdown_core::{CountdownError, Unit};
    use tempfile::TempDir;

    /// A fake tool: `sh <script>` so nothing needs to be executable
    fn fake_tool(dir: &TempDir, body: &str) -> Vec<String> {
        let script = dir.path().join("tool.sh");
        std::fs::write(&script, body).unwrap();
        vec!["sh".to_string(), script.display().to_string()]
    }

    fn test_invocation() -> Invocation {
        Invocation::Test {
            args: Vec::new(),
            non_test_args: Vec::new(),
            run_pattern: None,
        }
    }

    #[test]
    fn test_command_args_test_mode() {
        let executor = UnitExecutor::new(
            vec!["go".to_string()],
            Invocation::Test {
                args: vec!["-race".to_string()],
                non_test_args: vec!["-v23.tests".to_string()],
                run_pattern: Some("^TestV23".to_string()),
            },
            Duration::from_secs(300),
        );
        let task = Task::restricted(
            Unit::new("v.io/x/ref"),
            vec!["TestA".to_string(), "TestB".to_string()],
            Vec::new(),
        )
        .unwrap();
        assert_eq!(
            executor.command_args(&task, None).join(" "),
            "test -timeout 5m0s -v -race -run TestA|TestB v.io/x/ref -v23.tests"
        );

        let all = Task::new(Unit::new("v.io/x/ref"));
        assert_eq!(
            executor.command_args(&all, None).join(" "),
            "test -timeout 5m0s -v -race -run ^TestV23 v.io/x/ref -v23.tests"
        );
    }

    #[test]
    fn test_command_args_build_and_coverage() {
        let build = UnitExecutor::new(
            vec!["go".to_string()],
            Invocation::Build {
                bin_dir: PathBuf::from("/tmp/bin"),
                args: Vec::new(),
            },
            Duration::from_secs(600),
        );
        let task = Task::new(Unit::new("v.io/x/ref/services/agentd"));
        assert_eq!(
            build.command_args(&task, None).join(" "),
            "build -o /tmp/bin/agentd v.io/x/ref/services/agentd"
        );

        let coverage = UnitExecutor::new(
            vec!["go".to_string()],
            Invocation::Coverage { args: Vec::new() },
            Duration::from_secs(300),
        );
        assert_eq!(
            coverage
                .command_args(&task, Some(Path::new("/tmp/c.out")))
                .join(" "),
            "test -cover -coverprofile /tmp/c.out -timeout 5m0s -v v.io/x/ref/services/agentd"
        );
    }

    #[tokio::test]
    async fn test_execute_passes_and_merges_output() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(
            &dir,
            "echo '=== RUN   TestA'\necho 'to stderr' >&2\necho '--- PASS: TestA (0.00s)'\nexit 0\n",
        );
        let executor = UnitExecutor::new(tool, test_invocation(), Duration::from_secs(10));

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert!(outcome.output.contains("--- PASS: TestA"));
        assert!(outcome.output.contains("to stderr"));
        assert!(outcome.coverage.is_none());
    }

    #[tokio::test]
    async fn test_execute_classifies_build_failure() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(&dir, "echo '# pkg'\necho 'undefined: x'\nexit 2\n");
        let executor = UnitExecutor::new(tool, test_invocation(), Duration::from_secs(10));

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::BuildFailed);
    }

    #[tokio::test]
    async fn test_build_mode_any_failure_is_build_failure() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(&dir, "echo 'no such package'\nexit 1\n");
        let executor = UnitExecutor::new(
            tool,
            Invocation::Build {
                bin_dir: dir.path().to_path_buf(),
                args: Vec::new(),
            },
            Duration::from_secs(10),
        );

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::BuildFailed);
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(&dir, "echo started\nsleep 10\necho done\n");
        let executor = UnitExecutor::new(tool, test_invocation(), Duration::from_millis(300));

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert!(outcome.duration < Duration::from_secs(5));
        assert!(!outcome.output.contains("done"));
    }

    #[tokio::test]
    async fn test_coverage_artifact_is_handed_off() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(
            &dir,
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-coverprofile" ]; then shift; printf 'mode: set\npkg/a.go:1.1,2.2 1 1\n' > "$1"; fi
  shift
done
echo 'ok  	pkg	0.01s'
"#,
        );
        let executor = UnitExecutor::new(
            tool,
            Invocation::Coverage { args: Vec::new() },
            Duration::from_secs(10),
        );

        let unit = Unit::new("pkg");
        let outcome = executor.execute(Task::new(unit.clone())).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        let artifact = outcome.coverage.expect("coverage artifact");
        assert!(artifact.read_profile(&unit).unwrap().contains("pkg/a.go:1.1,2.2 1 1"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let executor = UnitExecutor::new(
            vec!["/nonexistent/countdown-tool".to_string()],
            test_invocation(),
            Duration::from_secs(1),
        );
        let err = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap_err();
        assert!(matches!(
            err,
            CountdownError::Execution(ExecutionError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let dir = TempDir::new().unwrap();
        let tool = fake_tool(&dir, "echo \"bin=$BIN_DIR\"\n");
        let mut env = HashMap::new();
        env.insert("BIN_DIR".to_string(), "/opt/bin".to_string());
        let executor =
            UnitExecutor::new(tool, test_invocation(), Duration::from_secs(10)).with_env(env);

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert!(outcome.output.contains("bin=/opt/bin"));
    }

    /// State of `pid` from `/proc`, `None` once it is gone
    #[cfg(target_os = "linux")]
    fn process_state(pid: &str) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        stat.rsplit_once(") ")?.1.chars().next()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_the_whole_process_tree() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let tool = fake_tool(
            &dir,
            &format!("sleep 47 &\necho $! > {}\nwait\n", pid_file.display()),
        );
        let executor = UnitExecutor::new(tool, test_invocation(), Duration::from_millis(500));

        let outcome = executor.execute(Task::new(Unit::new("pkg"))).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut state = process_state(&pid);
        for _ in 0..20 {
            if matches!(state, None | Some('Z')) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            state = process_state(&pid);
        }
        assert!(
            matches!(state, None | Some('Z')),
            "grandchild {} still running: {:?}",
            pid,
            state
        );
    }
}
