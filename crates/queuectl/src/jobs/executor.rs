use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Result of running one job command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the process never started, was killed by a signal, or
    /// ran past the deadline.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, trimmed. Stored as the job output.
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr).trim().to_string()
    }

    /// Diagnostic text recorded as `last_error` for a failed attempt.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "failed".to_string(),
        }
    }

    fn failed(stderr: String) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr,
        }
    }
}

/// Runs job commands through the host shell.
///
/// With no timeout a command may occupy its worker indefinitely. With one,
/// the child is killed at the deadline and the attempt counts as failed.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn run(&self, command: &str) -> ExecOutcome {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return ExecOutcome::failed(format!("failed to start command: {e}")),
        };

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(dur) => match tokio::time::timeout(dur, wait).await {
                Ok(res) => res,
                Err(_) => {
                    return ExecOutcome::failed(format!(
                        "command timed out after {}s",
                        dur.as_secs_f64()
                    ))
                }
            },
            None => wait.await,
        };

        match output {
            Ok(out) => ExecOutcome {
                exit_code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            },
            Err(e) => ExecOutcome::failed(format!("failed to collect command output: {e}")),
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
