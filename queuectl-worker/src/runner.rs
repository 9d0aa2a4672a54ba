//! Execution of a job's shell command.
//!
//! The runner is a pure collaborator: it has no access to the store and
//! never fails as a function. Whatever goes wrong while running a command
//! comes back as a [`RunOutcome::Failure`] with a diagnostic for the job's
//! `error_message`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Wall-clock ceiling on a single command execution.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

const TIMEOUT_DIAGNOSTIC: &str = "Command timed out after 5 minutes";
const NOT_FOUND_DIAGNOSTIC: &str = "Command not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command: &str) -> RunOutcome;
}

/// Runs commands through the platform shell with output capture and a
/// timeout.
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn execute(&self, command: &str) -> RunOutcome {
        let mut shell = shell_command(command);
        shell
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match shell.spawn() {
            Ok(child) => child,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return RunOutcome::Failure(NOT_FOUND_DIAGNOSTIC.to_owned());
            }
            Err(error) => return RunOutcome::Failure(error.to_string()),
        };

        // On timeout the wait future is dropped, and kill_on_drop reaps
        // the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return RunOutcome::Failure(error.to_string()),
            Err(_) => return RunOutcome::Failure(TIMEOUT_DIAGNOSTIC.to_owned()),
        };

        if output.status.success() {
            return RunOutcome::Success;
        }

        let mut diagnostic = match output.status.code() {
            Some(code) => format!("Exit code {code}"),
            None => "Command terminated by signal".to_owned(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            diagnostic.push_str(": ");
            diagnostic.push_str(stderr);
        }

        RunOutcome::Failure(diagnostic)
    }
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let runner = ShellRunner::new();
        assert_eq!(runner.execute("true").await, RunOutcome::Success);
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let runner = ShellRunner::new();
        assert_eq!(
            runner.execute("exit 3").await,
            RunOutcome::Failure("Exit code 3".to_owned())
        );
    }

    #[tokio::test]
    async fn test_stderr_is_appended_to_the_diagnostic() {
        let runner = ShellRunner::new();
        assert_eq!(
            runner.execute("echo boom >&2; exit 1").await,
            RunOutcome::Failure("Exit code 1: boom".to_owned())
        );
    }

    #[tokio::test]
    async fn test_missing_command_inside_the_shell() {
        let runner = ShellRunner::new();
        match runner.execute("definitely-not-a-real-command-9f2").await {
            RunOutcome::Failure(diagnostic) => {
                assert!(diagnostic.starts_with("Exit code 127"), "{diagnostic}");
            }
            RunOutcome::Success => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = ShellRunner::with_timeout(Duration::from_millis(100));
        assert_eq!(
            runner.execute("sleep 5").await,
            RunOutcome::Failure(TIMEOUT_DIAGNOSTIC.to_owned())
        );
    }

    #[tokio::test]
    async fn test_stdout_is_not_mistaken_for_stderr() {
        let runner = ShellRunner::new();
        assert_eq!(
            runner.execute("echo noise; exit 2").await,
            RunOutcome::Failure("Exit code 2".to_owned())
        );
    }
}
