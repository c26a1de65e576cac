//! Sandboxed subprocess execution.
//!
//! Children get a cleared environment (PATH and HOME only), a null stdin,
//! their own process group and no core dumps. On timeout the whole group is
//! killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::WardenError;

/// Bytes kept per output stream.
pub const OUTPUT_CAP: usize = 256 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Time allowed for output readers to drain after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SandboxedCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub path_env: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The child exited on its own, with any exit code.
    Exited,
    TimedOut,
    SpawnFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub cmd: Vec<String>,
    pub rc: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: ProcessOutcome,
}

impl SandboxedCommand {
    pub fn display_cmd(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .env("PATH", &self.path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = std::env::var_os("HOME") {
            cmd.env("HOME", home);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
            // SAFETY: the closure only calls setrlimit, which is
            // async-signal-safe.
            unsafe {
                cmd.pre_exec(|| {
                    let limit = libc::rlimit {
                        rlim_cur: 0,
                        rlim_max: 0,
                    };
                    libc::setrlimit(libc::RLIMIT_CORE, &limit);
                    Ok(())
                });
            }
        }

        cmd
    }

    /// Run to completion or until the timeout elapses. Never fails.
    pub async fn run(&self) -> ProcessResult {
        let cmd_line = self.display_cmd();
        tracing::debug!(cmd = ?cmd_line, timeout_secs = self.timeout.as_secs(), "spawning tool");

        let mut child = match self.build().spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(program = %self.program.display(), error = %e, "failed to spawn tool");
                return ProcessResult {
                    cmd: cmd_line,
                    rc: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    outcome: ProcessOutcome::SpawnFailed,
                };
            }
        };

        let pid = child.id();
        let stdout_task = tokio::spawn(read_capped(child.stdout.take()));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take()));

        let (rc, outcome, wait_error) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), ProcessOutcome::Exited, None),
            Ok(Err(e)) => (None, ProcessOutcome::SpawnFailed, Some(e.to_string())),
            Err(_) => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "child already gone after group kill");
                }
                (None, ProcessOutcome::TimedOut, None)
            }
        };

        let stdout = drain(stdout_task).await;
        let mut stderr = drain(stderr_task).await;
        match (outcome, wait_error) {
            (ProcessOutcome::TimedOut, _) => {
                let err = WardenError::ToolTimeout {
                    tool: self.tool_name(),
                    timeout: self.timeout,
                };
                tracing::warn!(error = %err, "tool killed");
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str(&err.to_string());
            }
            (_, Some(e)) => stderr = e,
            _ => {}
        }

        ProcessResult {
            cmd: cmd_line,
            rc,
            stdout,
            stderr,
            outcome,
        }
    }
}

async fn drain(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => String::new(),
    }
}

/// Read a stream to EOF, keeping at most [`OUTPUT_CAP`] bytes.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = OUTPUT_CAP.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                tracing::debug!(error = %e, "error reading tool output");
                break;
            }
        }
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, "killpg failed, process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tools::{resolve_binary, DEFAULT_PATH};

    fn command(tool: &str, args: &[&str], timeout: Duration) -> SandboxedCommand {
        SandboxedCommand {
            program: resolve_binary(tool, DEFAULT_PATH).unwrap(),
            args: args.iter().map(|a| a.to_string()).collect(),
            path_env: DEFAULT_PATH.into(),
            timeout,
        }
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let result = command("sh", &["-c", "echo out; echo err >&2; exit 3"], Duration::from_secs(10))
            .run()
            .await;
        assert_eq!(result.outcome, ProcessOutcome::Exited);
        assert_eq!(result.rc, Some(3));
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        std::env::set_var("SCANWARDEN_LEAK_CHECK", "leaked");
        let result = command("sh", &["-c", "echo ${SCANWARDEN_LEAK_CHECK:-clean}"], Duration::from_secs(10))
            .run()
            .await;
        assert_eq!(result.stdout.trim(), "clean");
    }

    #[tokio::test]
    async fn timeout_kills_process_group() {
        let started = std::time::Instant::now();
        let result = command("sh", &["-c", "sleep 30 & sleep 30"], Duration::from_millis(200))
            .run()
            .await;
        assert_eq!(result.outcome, ProcessOutcome::TimedOut);
        assert_eq!(result.rc, None);
        assert!(result.stderr.ends_with("Tool sh timed out after 200ms"), "{}", result.stderr);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let result = command("sh", &["-c", "head -c 400000 /dev/zero | tr '\\0' a"], Duration::from_secs(10))
            .run()
            .await;
        assert!(result.stdout.len() <= OUTPUT_CAP + TRUNCATION_MARKER.len());
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let cmd = SandboxedCommand {
            program: PathBuf::from("/nonexistent/scanwarden-tool"),
            args: vec![],
            path_env: DEFAULT_PATH.into(),
            timeout: Duration::from_secs(1),
        };
        let result = cmd.run().await;
        assert_eq!(result.outcome, ProcessOutcome::SpawnFailed);
        assert_eq!(result.rc, None);
    }
}
