//! Command Runner
//!
//! The only place in the crate that talks to an operating-system process.
//! Blocking invocations capture stdout/stderr and enforce a timeout;
//! launches spawn a detached process and return as soon as it exists.

use crate::{OperationError, Result, log_debug, log_error, log_info, log_warn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Timeout applied when a spec does not choose one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and SIGKILL for a timed-out child.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// One invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// `None` disables the timeout.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program followed by its arguments, space separated.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(OperationError::invalid("program name must not be empty"));
        }
        Ok(())
    }
}

/// Captured outcome of a blocking invocation that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandResult {
    /// Successful result with the given stdout, used by runners that do not
    /// spawn anything.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Opaque reference to a launched, untracked process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub id: Uuid,
    pub pid: Option<u32>,
    pub program: String,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(program: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            program: program.into(),
            started_at: Utc::now(),
        }
    }
}

/// Executes external programs on behalf of the resource operations.
///
/// `run` returns `Ok` only for a zero exit status; a nonzero exit becomes
/// [`OperationError::ExecutionFailed`] with stderr preserved verbatim.
/// Neither method retries.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> Result<CommandResult>;

    async fn launch(&self, spec: CommandSpec) -> Result<ProcessHandle>;
}

/// [`CommandRunner`] backed by real processes found through `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandResult> {
        spec.validate()?;
        log_debug!(
            program = %spec.program,
            args = ?spec.args,
            timeout = ?spec.timeout,
            "running command"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so a timeout can reach helpers the tool forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| spawn_error(&spec.program, e))?;
        let pid = child.id();

        let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));
        let readers: Vec<_> = stdout_task
            .iter()
            .chain(stderr_task.iter())
            .map(|task| task.abort_handle())
            .collect();

        // A forked helper can hold the pipes open after the tool exits, so
        // the deadline covers draining them too.
        let completion = async {
            let status = child.wait().await;
            (status, collect(stdout_task).await, collect(stderr_task).await)
        };

        let outcome = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, completion).await.ok(),
            None => Some(completion.await),
        };

        let Some((status, stdout, stderr)) = outcome else {
            let limit = spec.timeout.unwrap_or_default();
            log_warn!(
                program = %spec.program,
                timeout_secs = limit.as_secs(),
                "command timed out, terminating"
            );
            for reader in &readers {
                reader.abort();
            }
            terminate(&mut child, pid).await;
            return Err(OperationError::Timeout {
                tool: spec.program.clone(),
                after: limit,
            });
        };

        let status = status.map_err(|e| OperationError::ExecutionFailed {
            tool: spec.program.clone(),
            code: None,
            stderr: e.to_string(),
        })?;
        let elapsed = started.elapsed();

        finish(&spec.program, status, stdout, stderr, elapsed)
    }

    async fn launch(&self, spec: CommandSpec) -> Result<ProcessHandle> {
        spec.validate()?;
        log_debug!(program = %spec.program, args = ?spec.args, "launching detached process");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so a Ctrl-C aimed at us does not reach the child.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| spawn_error(&spec.program, e))?;
        let handle = ProcessHandle::new(spec.program.clone(), child.id());

        log_info!(
            program = %spec.program,
            pid = ?handle.pid,
            handle = %handle.id,
            "process launched"
        );

        // Dropping the child leaves it running; tokio reaps it once it exits.
        drop(child);
        Ok(handle)
    }
}

fn spawn_error(program: &str, err: io::Error) -> OperationError {
    if err.kind() == io::ErrorKind::NotFound {
        log_warn!(program = %program, "executable not found");
        OperationError::ToolNotFound {
            tool: program.to_string(),
        }
    } else {
        log_error!(program = %program, error = %err, "failed to spawn");
        OperationError::ExecutionFailed {
            tool: program.to_string(),
            code: None,
            stderr: err.to_string(),
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(task) => {
            let bytes = task.await.unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => String::new(),
    }
}

fn finish(
    program: &str,
    status: ExitStatus,
    stdout: String,
    stderr: String,
    elapsed: Duration,
) -> Result<CommandResult> {
    match status.code() {
        Some(0) => {
            log_debug!(program = %program, elapsed_ms = elapsed.as_millis() as u64, "command succeeded");
            Ok(CommandResult {
                exit_code: 0,
                stdout,
                stderr,
                elapsed,
            })
        }
        code => {
            log_warn!(program = %program, code = ?code, "command failed");
            Err(OperationError::ExecutionFailed {
                tool: program.to_string(),
                code,
                stderr,
            })
        }
    }
}

/// SIGTERM to the child's process group, a short grace period, then
/// SIGKILL to whatever is left of the group. Always reaps the child.
#[cfg_attr(not(unix), allow(unused_variables))]
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            let group = Pid::from_raw(pid as i32);
            let _ = killpg(group, Signal::SIGTERM);
            let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
            let _ = killpg(group, Signal::SIGKILL);
        }
    }

    if matches!(child.try_wait(), Ok(None)) {
        if let Err(e) = child.kill().await {
            log_error!(error = %e, "failed to kill timed-out process");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let result = SystemRunner::new()
            .run(sh("echo out; echo err >&2"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_stderr_verbatim() {
        let err = SystemRunner::new()
            .run(sh("echo 'boom: bad thing' >&2; exit 3"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::ExecutionFailed {
                tool: "sh".into(),
                code: Some(3),
                stderr: "boom: bad thing\n".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let err = SystemRunner::new()
            .run(CommandSpec::new("stratus-definitely-not-installed"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    }

    #[tokio::test]
    async fn empty_program_is_rejected() {
        let err = SystemRunner::new().run(CommandSpec::new("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn slow_command_times_out_and_is_reaped() {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; sleep 10", pid_file.display());

        let started = Instant::now();
        let err = SystemRunner::new()
            .run(sh(&script).timeout(Some(Duration::from_millis(500))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH));
    }

    #[tokio::test]
    async fn background_helper_holding_pipes_cannot_outlast_timeout() {
        let started = Instant::now();
        let err = SystemRunner::new()
            .run(sh("sleep 20 & echo hi").timeout(Some(Duration::from_secs(1))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemRunner::new()
            .run(CommandSpec::new("pwd").working_dir(dir.path()))
            .await
            .unwrap();
        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn launch_returns_without_waiting() {
        let started = Instant::now();
        let handle = SystemRunner::new()
            .launch(CommandSpec::new("sleep").arg("2"))
            .await
            .unwrap();
        assert!(handle.pid.is_some());
        assert_eq!(handle.program, "sleep");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn launch_of_missing_program_fails() {
        let err = SystemRunner::new()
            .launch(CommandSpec::new("stratus-definitely-not-installed"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = CommandSpec::new("docker").args(["ps", "-a"]);
        assert_eq!(spec.command_line(), "docker ps -a");
        assert_eq!(spec.timeout, Some(DEFAULT_TIMEOUT));
    }
}
