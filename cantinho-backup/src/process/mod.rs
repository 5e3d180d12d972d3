//! Supervision of external command-line tools.
//!
//! A supervised run:
//! - spawns the tool in its own process group with stdin closed
//! - drains stdout and stderr on two concurrent tasks so neither pipe fills up
//! - bounds the wait by a time budget and kills the whole group when it runs out
//! - joins both drain tasks before reporting, so diagnostics are never truncated
//!
//! Exit codes are reported as-is; deciding what counts as success is left to
//! the caller (see [`Tool`]).

pub mod tool;

pub use tool::Tool;

use crate::config::ToolCommand;
use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long output streams may stay open once the process itself is gone
const DRAIN_GRACE: Duration = Duration::from_secs(5);

type DrainTask = JoinHandle<std::io::Result<String>>;

/// Exit code reported for a process that was terminated by a signal
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Everything a supervised run reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// The tool's own error text: stderr, or stdout when stderr is empty
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// A fully specified tool launch.
pub struct Invocation {
    tool: Tool,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(tool: Tool, command: &ToolCommand) -> Self {
        Self {
            tool,
            program: command.program().to_string(),
            args: command.args().to_vec(),
            env: Vec::new(),
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

    /// Set an environment variable for the child only
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

// Environment values carry the database password; only keys are shown.
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("tool", &self.tool)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// Runs external tools under a time budget.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    drain_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            drain_grace: DRAIN_GRACE,
        }
    }

    /// Override how long output streams may outlive the process
    pub fn with_drain_grace(drain_grace: Duration) -> Self {
        Self { drain_grace }
    }

    /// Run `invocation` to completion or until `time_limit` expires.
    ///
    /// Only launch failures and stream read errors are returned as `Err`;
    /// a nonzero exit or an expired budget is reported in the outcome.
    pub async fn run(&self, invocation: &Invocation, time_limit: Duration) -> Result<ProcessOutcome> {
        let tool = invocation.tool.name();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!(tool, program = %invocation.program, args = ?invocation.args, "Launching process");

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|source| BackupError::Spawn { tool, source })?;
        let pid = child.id();

        let abandon = CancellationToken::new();
        let stdout_task = tokio::spawn(drain(child.stdout.take(), tool, "stdout", abandon.clone()));
        let stderr_task = tokio::spawn(drain(child.stderr.take(), tool, "stderr", abandon.clone()));

        let (exit_code, timed_out) = match tokio::time::timeout(time_limit, child.wait()).await {
            Ok(Ok(status)) => (status.code().unwrap_or(SIGNALLED_EXIT_CODE), false),
            Ok(Err(e)) => {
                warn!(tool, pid, error = %e, "Failed to wait for process, terminating it");
                terminate(&mut child, pid).await;
                abandon_drains(pid, &abandon, stdout_task, stderr_task).await;
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    tool,
                    pid,
                    budget_secs = time_limit.as_secs(),
                    "Time budget exceeded, terminating process"
                );
                terminate(&mut child, pid).await;
                (SIGNALLED_EXIT_CODE, true)
            }
        };

        // Both streams must reach EOF before the outcome is reported. A
        // descendant that inherited the pipes can keep them open, so the
        // join is bounded and the tasks are told to give up afterwards.
        let drains = async { tokio::join!(stdout_task, stderr_task) };
        tokio::pin!(drains);
        let (stdout, stderr) = match tokio::time::timeout(self.drain_grace, &mut drains).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(tool, pid, "Output streams still open after process exit, abandoning them");
                kill_group(pid);
                abandon.cancel();
                drains.await
            }
        };
        let stdout = stdout.map_err(std::io::Error::other)??;
        let stderr = stderr.map_err(std::io::Error::other)??;

        info!(
            tool,
            exit_code,
            timed_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Process finished"
        );

        Ok(ProcessOutcome {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Kill the child's whole process group and reap the child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if !kill_group(pid) {
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "Failed to kill process");
        }
    }

    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap terminated process");
    }
}

/// SIGKILL every process in the group led by `pid`. Returns false if nothing was signalled.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return false;
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, error = %e, "Failed to kill process group");
            false
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) -> bool {
    false
}

/// Stop both drain tasks without waiting for EOF and join them.
async fn abandon_drains(
    pid: Option<u32>,
    abandon: &CancellationToken,
    stdout_task: DrainTask,
    stderr_task: DrainTask,
) {
    kill_group(pid);
    abandon.cancel();
    let _ = tokio::join!(stdout_task, stderr_task);
}

/// Read one output stream to EOF, logging each line at debug level.
async fn drain<R>(
    reader: Option<R>,
    tool: &'static str,
    stream: &'static str,
    abandon: CancellationToken,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            read = reader.read_until(b'\n', &mut line) => read?,
            _ = abandon.cancelled() => {
                captured.extend_from_slice(&line);
                break;
            }
        };
        if read == 0 {
            break;
        }
        debug!(tool, stream, "{}", String::from_utf8_lossy(&line).trim_end());
        captured.extend_from_slice(&line);
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}
