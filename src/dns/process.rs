//! Bounded execution of external commands

use std::fmt;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug)]
pub struct CommandFailureInfo {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command [{}] failed with {}", self.command, self.status)?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ExecutionError {
    ExecutionStart { command: String, err: std::io::Error },
    CommandFailure(Box<CommandFailureInfo>),
    Timeout { command: String, timeout: Duration },
    EmptyCommand,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::ExecutionStart { command, err } => {
                write!(f, "Failed to start execution of [{}]: {}", command, err)
            }
            ExecutionError::CommandFailure(info) => write!(f, "{}", info),
            ExecutionError::Timeout { command, timeout } => {
                write!(f, "Command [{}] timed out after {:?}", command, timeout)
            }
            ExecutionError::EmptyCommand => write!(f, "No command configured"),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::ExecutionStart { err, .. } => Some(err),
            _ => None,
        }
    }
}

fn command_to_string(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(|s| s.as_str()))
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Run `program args...` with no stdin, capture its output and kill it if it
/// outlives `timeout`. The exit status is not checked.
///
/// Must not be called from inside a tokio runtime.
pub fn output_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output, ExecutionError> {
    let command = command_to_string(program, args);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| ExecutionError::ExecutionStart {
            command: command.clone(),
            err,
        })?;

    let mut child = Command::new(program);
    child
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    runtime.block_on(async {
        match tokio::time::timeout(timeout, child.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(ExecutionError::ExecutionStart { command, err }),
            Err(_) => Err(ExecutionError::Timeout { command, timeout }),
        }
    })
}

/// Like [`output_with_timeout`] for an argv vector, failing on a non-zero exit.
pub fn execute(argv: &[String], timeout: Duration) -> Result<Output, ExecutionError> {
    let (program, args) = argv.split_first().ok_or(ExecutionError::EmptyCommand)?;
    let output = output_with_timeout(program, args, timeout)?;

    if !output.status.success() {
        return Err(ExecutionError::CommandFailure(Box::new(CommandFailureInfo {
            command: command_to_string(program, args),
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })));
    }

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_execute_success() {
        let output = execute(&argv(&["sh", "-c", "echo hello"]), Duration::from_secs(5)).unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
    }

    #[test]
    fn test_execute_nonzero_exit() {
        match execute(&argv(&["sh", "-c", "echo oops >&2; exit 3"]), Duration::from_secs(5)) {
            Err(ExecutionError::CommandFailure(info)) => {
                assert_eq!(info.status.code(), Some(3));
                assert_eq!(info.stderr, "oops\n");
                assert!(info.to_string().contains("oops"));
            }
            other => panic!("Expected command failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_binary() {
        let result = execute(&argv(&["/nonexistent/reload-bind"]), Duration::from_secs(5));
        assert!(matches!(result, Err(ExecutionError::ExecutionStart { .. })));
    }

    #[test]
    fn test_timeout_kills_child() {
        let result = execute(&argv(&["sleep", "5"]), Duration::from_millis(100));
        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            execute(&[], Duration::from_secs(1)),
            Err(ExecutionError::EmptyCommand)
        ));
    }
}
